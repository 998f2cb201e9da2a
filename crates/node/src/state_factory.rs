use std::sync::Arc;

use delta_state::DealStore;
use delta_state_memory::MemoryDealStore;
use tracing::info;

use crate::config::StateConfig;
use crate::error::NodeError;

/// Create the deal store described by `config`.
///
/// Relational backends run their migrations while connecting.
pub async fn create_store(config: &StateConfig) -> Result<Arc<dyn DealStore>, NodeError> {
    match config.backend.as_str() {
        "memory" => {
            info!("using in-memory deal store");
            Ok(Arc::new(MemoryDealStore::new()))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            use delta_state_postgres::{PostgresConfig, PostgresDealStore};

            let defaults = PostgresConfig::default();
            let pg = PostgresConfig {
                url: config.url.clone().unwrap_or(defaults.url),
                pool_size: config.pool_size.unwrap_or(defaults.pool_size),
                table_prefix: config
                    .table_prefix
                    .clone()
                    .unwrap_or(defaults.table_prefix),
                schema: defaults.schema,
                ssl_mode: defaults.ssl_mode,
                ssl_root_cert: defaults.ssl_root_cert,
            };
            let store = PostgresDealStore::new(pg).await?;
            info!("using postgres deal store");
            Ok(Arc::new(store))
        }
        other => Err(NodeError::Config(format!(
            "unsupported state backend: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend() {
        let store = create_store(&StateConfig::default()).await.unwrap();
        assert_eq!(store.bytes_in_transfer().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let config = StateConfig {
            backend: "clickhouse".into(),
            ..StateConfig::default()
        };
        let err = create_store(&config).await.err().unwrap();
        assert!(err.to_string().contains("unsupported state backend"));
    }
}
