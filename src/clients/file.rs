//! JSON order book loading for the CLI's default record store.

use crate::error::{JoblensError, Result};
use crate::model::Order;
use std::path::Path;

/// Load an order listing from a JSON file (an array of orders).
pub fn load_orders_from_json(path: &Path) -> Result<Vec<Order>> {
    let content = std::fs::read_to_string(path).map_err(|e| JoblensError::Io {
        source: e,
        context: format!("Failed to read order book: {:?}", path),
    })?;
    let orders: Vec<Order> = serde_json::from_str(&content).map_err(|e| JoblensError::Json {
        source: e,
        context: format!("Failed to parse order book: {:?}", path),
    })?;
    Ok(orders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_order_book() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{
                "job_number": "1001",
                "customer": {{"id": "C1", "name": "Acme"}},
                "description": "Vinyl banner",
                "master_status": "Approved",
                "entered_date": "2024-03-01T09:00:00Z",
                "due_date": "2024-03-14T17:00:00Z",
                "tags": [{{"raw": "@laser"}}]
            }}]"#
        )
        .unwrap();

        let orders = load_orders_from_json(file.path()).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].job_number, "1001");
        assert_eq!(orders[0].tags[0].raw, "@laser");
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_orders_from_json(Path::new("/nonexistent/orders.json"));
        assert!(matches!(result, Err(JoblensError::Io { .. })));
    }
}
