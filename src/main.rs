use joblens::cache::{spawn_sweeper, ResultCache, QUERY_RESULT_TAG};
use joblens::cli::{Cli, Commands, ConfigAction};
use joblens::clients::{
    load_orders_from_json, EmbeddingProvider, HashingEmbedder, InMemoryRecordStore,
    InMemoryVectorIndex, LocalEmbedder, RecordStore, VectorIndex,
};
use joblens::config::Config;
use joblens::error::{JoblensError, Result};
use joblens::intent::IntentClassifier;
use joblens::router::{
    FreshnessPreference, QueryContext, RouteError, RoutedQueryResult, StrategyRouter,
};
use joblens::sync::{FingerprintStore, SqliteFingerprintStore, VectorSynchronizer};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Query {
            query,
            limit,
            sort,
            fresh,
            json,
        } => {
            cmd_query(cli.config, &query, limit, sort, fresh, json).await?;
        }
        Commands::Sync { full } => {
            cmd_sync(cli.config, full).await?;
        }
        Commands::Status => {
            cmd_status(cli.config).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "joblens=debug" } else { "joblens=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Wired engine components for one invocation
struct Engine {
    router: StrategyRouter,
    synchronizer: VectorSynchronizer,
    cache: Arc<ResultCache>,
    fingerprints: Arc<dyn FingerprintStore>,
}

fn build_engine(config: &Config) -> Result<Engine> {
    let record_store: Arc<dyn RecordStore> = match config.record_store.kind.as_str() {
        "json" => {
            let path = config.record_store.orders_file.as_ref().ok_or_else(|| {
                JoblensError::Config("record_store.orders_file is not set".to_string())
            })?;
            let orders = load_orders_from_json(&expand_path(path)?)?;
            tracing::info!("Loaded {} orders from {:?}", orders.len(), path);
            Arc::new(InMemoryRecordStore::new(orders))
        }
        _ => Arc::new(InMemoryRecordStore::new(Vec::new())),
    };

    let embedder: Arc<dyn EmbeddingProvider> = match config.embedding.provider.as_str() {
        "local" => Arc::new(
            LocalEmbedder::new(&config.embedding.model)
                .map_err(|e| JoblensError::Config(format!("Embedding model: {}", e)))?,
        ),
        _ => Arc::new(HashingEmbedder::new(config.embedding.dimension)),
    };

    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
    let fingerprints: Arc<dyn FingerprintStore> = Arc::new(SqliteFingerprintStore::new(
        &expand_path(&config.fingerprint_db_path())?,
    )?);
    let cache = Arc::new(ResultCache::new());
    spawn_sweeper(
        cache.clone(),
        std::time::Duration::from_secs(config.cache.sweep_interval_secs),
    );

    let router = StrategyRouter::new(
        IntentClassifier::rule_based(),
        record_store.clone(),
        embedder.clone(),
        index.clone(),
        cache.clone(),
        config.routing.clone(),
    );
    let synchronizer = VectorSynchronizer::new(
        record_store,
        embedder,
        index,
        fingerprints.clone(),
        cache.clone(),
        config.sync.clone(),
    );

    Ok(Engine {
        router,
        synchronizer,
        cache,
        fingerprints,
    })
}

async fn cmd_query(
    config_path: Option<std::path::PathBuf>,
    query: &str,
    limit: usize,
    sort: joblens::cli::SortArg,
    fresh: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = build_engine(&config)?;

    // The vector index lives in-process, so populate it before routing
    let report = engine
        .synchronizer
        .sync()
        .await
        .map_err(|e| JoblensError::Other(anyhow::anyhow!("Index sync failed: {}", e)))?;
    tracing::debug!(
        "Pre-query sync: {} new, {} updated, {} deleted",
        report.new_vectors,
        report.updated_vectors,
        report.deleted_vectors
    );

    let ctx = QueryContext {
        freshness: if fresh {
            FreshnessPreference::Fresh
        } else {
            FreshnessPreference::Default
        },
        sort: sort.into(),
        ..Default::default()
    };

    let mut result = engine.router.route(query, &ctx).await.map_err(route_error)?;
    result.orders.truncate(limit);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).map_err(|e| JoblensError::Json {
                source: e,
                context: "Failed to serialize query result".to_string(),
            })?
        );
    } else {
        print_result(query, &result);
    }

    Ok(())
}

fn route_error(e: RouteError) -> JoblensError {
    match e {
        RouteError::RetrievalUnavailable(msg) => JoblensError::RetrievalUnavailable(msg),
        RouteError::Intent(e) => JoblensError::Other(anyhow::anyhow!(e)),
    }
}

fn print_result(query: &str, result: &RoutedQueryResult) {
    println!("Query: {}", query);
    println!(
        "Strategy: {} | Confidence: {:.2} | Freshness: {:?} | {}ms",
        result.strategy.as_str(),
        result.confidence,
        result.data_freshness,
        result.processing_time_ms
    );
    if !result.fallbacks_used.is_empty() {
        println!("Fallbacks: {}", result.fallbacks_used.join(", "));
    }

    if result.orders.is_empty() {
        println!("\nNo matching orders.");
    } else {
        println!("\n{} matching orders:", result.orders.len());
        for order in &result.orders {
            let rush = if order.rush { " [RUSH]" } else { "" };
            let score = order
                .score
                .map(|s| format!(" (score {:.2})", s))
                .unwrap_or_default();
            println!(
                "  #{}{} {} - {} - due {}{}",
                order.job_number,
                rush,
                order.customer_name,
                order.master_status,
                order.due_date.format("%Y-%m-%d"),
                score
            );
        }
    }

    if let Some(agg) = &result.aggregates {
        println!(
            "\nTotals: {} orders, ${:.2}, {} rush",
            agg.order_count, agg.total_value, agg.rush_count
        );
    }
}

async fn cmd_sync(config_path: Option<std::path::PathBuf>, full: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = build_engine(&config)?;

    let report = if full {
        engine.synchronizer.rebuild().await
    } else {
        engine.synchronizer.sync().await
    }
    .map_err(|e| JoblensError::Other(anyhow::anyhow!("Sync failed: {}", e)))?;

    println!("Sync {} ({:?})", report.run_id, report.mode);
    println!(
        "  {} new, {} updated, {} deleted, {} unchanged ({}ms)",
        report.new_vectors,
        report.updated_vectors,
        report.deleted_vectors,
        report.unchanged_vectors,
        report.duration_ms
    );
    if report.is_partial_failure() {
        println!("  {} batch errors:", report.errors.len());
        for error in &report.errors {
            println!("    - {}", error);
        }
    }

    Ok(())
}

async fn cmd_status(config_path: Option<std::path::PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = build_engine(&config)?;

    println!("Joblens Status");
    println!("==============");
    println!("\nFingerprints tracked: {}", engine.fingerprints.count()?);

    let pending = engine
        .synchronizer
        .pending_changes()
        .await
        .map_err(|e| JoblensError::Other(anyhow::anyhow!("Change scan failed: {}", e)))?;
    println!(
        "Pending changes: {} new, {} updated, {} deleted",
        pending.new_orders.len(),
        pending.updated_orders.len(),
        pending.deleted_order_ids.len()
    );

    println!(
        "Cached results: {} (tag {:?})",
        engine.cache.len(),
        QUERY_RESULT_TAG
    );

    Ok(())
}

fn cmd_config(config_path: Option<std::path::PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| JoblensError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file {
                Some(path) => path,
                None => Config::default_path()?,
            };
            Config::load(&path)?;
            println!("✓ Configuration is valid");
        }
        ConfigAction::Init { force } => {
            let path = Config::default_path()?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            let config = Config::default();
            config.save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'joblens config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}

fn expand_path(path: &std::path::Path) -> Result<std::path::PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| JoblensError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| JoblensError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
