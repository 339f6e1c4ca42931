use std::time::Duration;

use sg_core::config::GateConfig;
use sg_db::{DataSource, DatabaseMeta};
use tracing::info;

use crate::error::ServiceError;

/// Checks whether a client's target MySQL instance is reachable.
#[derive(Debug, Clone)]
pub struct ConnectionService {
    timeout: Duration,
}

impl ConnectionService {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.probe_timeout())
    }

    /// Open, ping and close one connection to `dsn`.
    pub async fn test_connection(&self, dsn: &str) -> Result<(), ServiceError> {
        info!("Testing database connection");
        sg_db::probe(dsn, self.timeout).await?;
        Ok(())
    }

    /// Connect to `source` and report what kind of server answered.
    pub async fn describe(&self, source: &DataSource) -> Result<DatabaseMeta, ServiceError> {
        info!(url = %source.redacted_url(), "Describing database");
        Ok(sg_db::probe_with_metadata(source, self.timeout).await?)
    }
}
