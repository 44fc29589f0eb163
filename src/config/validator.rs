use crate::config::Config;
use crate::error::{JoblensError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_storage(config, &mut errors);
        Self::validate_record_store(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_routing(config, &mut errors);
        Self::validate_cache(config, &mut errors);
        Self::validate_sync(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(JoblensError::ConfigValidation { errors })
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory path cannot be empty",
            ));
        }
        if config.storage.fingerprint_db.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.fingerprint_db",
                "Fingerprint database path cannot be empty",
            ));
        }
    }

    fn validate_record_store(config: &Config, errors: &mut Vec<ValidationError>) {
        let kind = &config.record_store.kind;
        let valid_kinds = ["json", "memory"];
        if !valid_kinds.contains(&kind.as_str()) {
            errors.push(ValidationError::new(
                "record_store.kind",
                format!("Kind must be one of {:?}, got '{}'", valid_kinds, kind),
            ));
        }
        if kind == "json" && config.record_store.orders_file.is_none() {
            errors.push(ValidationError::new(
                "record_store.orders_file",
                "Orders file is required for the json record store",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        let valid_providers = ["local", "hashing"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Vector dimension must be greater than 0",
            ));
        }
    }

    fn validate_routing(config: &Config, errors: &mut Vec<ValidationError>) {
        let routing = &config.routing;

        if routing.relaxation_thresholds.is_empty() {
            errors.push(ValidationError::new(
                "routing.relaxation_thresholds",
                "At least one relaxation threshold is required",
            ));
        }
        for t in &routing.relaxation_thresholds {
            if !(*t > 0.0 && *t <= 1.0) {
                errors.push(ValidationError::new(
                    "routing.relaxation_thresholds",
                    format!("Threshold {} is outside (0.0, 1.0]", t),
                ));
            }
        }
        // Strict-to-loose order is what the relaxation walk relies on
        if routing
            .relaxation_thresholds
            .windows(2)
            .any(|w| w[0] <= w[1])
        {
            errors.push(ValidationError::new(
                "routing.relaxation_thresholds",
                "Thresholds must be strictly descending",
            ));
        }

        if routing.top_k_narrow == 0 {
            errors.push(ValidationError::new(
                "routing.top_k_narrow",
                "topK must be greater than 0",
            ));
        }
        if routing.top_k_narrow > routing.top_k_medium
            || routing.top_k_medium > routing.top_k_broad
        {
            errors.push(ValidationError::new(
                "routing.top_k_medium",
                "topK tiers must be monotonic: narrow <= medium <= broad",
            ));
        }

        if routing.enrichment_cap == 0 {
            errors.push(ValidationError::new(
                "routing.enrichment_cap",
                "Enrichment cap must be greater than 0",
            ));
        }
        if routing.call_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "routing.call_timeout_ms",
                "Call timeout must be greater than 0",
            ));
        }
        if routing.fresh_ttl_secs == 0 || routing.general_ttl_secs == 0 {
            errors.push(ValidationError::new(
                "routing.fresh_ttl_secs",
                "Cache TTLs must be greater than 0",
            ));
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.cache.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "cache.sweep_interval_secs",
                "Sweep interval must be greater than 0",
            ));
        }
    }

    fn validate_sync(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.sync.batch_size == 0 {
            errors.push(ValidationError::new(
                "sync.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_ascending_thresholds_rejected() {
        let mut config = Config::default();
        config.routing.relaxation_thresholds = vec![0.3, 0.6];
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut config = Config::default();
        config.routing.relaxation_thresholds = vec![1.5, 0.3];
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_non_monotonic_top_k() {
        let mut config = Config::default();
        config.routing.top_k_medium = config.routing.top_k_broad + 1;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.embedding.provider = "remote".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_json_store_requires_orders_file() {
        let mut config = Config::default();
        config.record_store.kind = "json".to_string();
        config.record_store.orders_file = None;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = Config::default();
        config.sync.batch_size = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
