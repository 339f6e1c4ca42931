use serde::{Deserialize, Serialize};
use sg_core::config::GateConfig;
use sg_core::security::hybrid::EncryptedPayload;
use sg_core::soar::ArgumentMap;
use sg_db::{DataSource, DatabaseMeta};
use tracing::warn;

use crate::analysis::{AnalysisRequest, AnalysisService};
use crate::connection::ConnectionService;
use crate::error::ServiceError;

/// One client request as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GatewayRequest {
    /// Plain `soar` arguments.
    Args(ArgumentMap),
    /// Hybrid-encrypted `soar` arguments.
    Encrypted(EncryptedPayload),
    /// Connectivity check against a `mysql://` DSN.
    Probe(String),
    /// Connectivity check plus server metadata.
    Describe(DataSource),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loginfo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<DatabaseMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GatewayResponse {
    fn failure(err: &ServiceError, with_output: bool) -> Self {
        Self {
            ok: false,
            stdout: with_output.then(|| String::from_utf8_lossy(&err.output()).into_owned()),
            loginfo: with_output.then(|| String::from_utf8_lossy(&err.loginfo()).into_owned()),
            meta: None,
            error: Some(err.to_string()),
        }
    }
}

/// Routes requests to the analysis and connection services.
pub struct Gateway {
    analysis: AnalysisService,
    connection: ConnectionService,
}

impl Gateway {
    pub fn new(analysis: AnalysisService, connection: ConnectionService) -> Self {
        Self {
            analysis,
            connection,
        }
    }

    pub async fn from_config(config: &GateConfig) -> Result<Self, ServiceError> {
        Ok(Self::new(
            AnalysisService::from_config(config).await?,
            ConnectionService::from_config(config),
        ))
    }

    pub async fn handle(&self, request: GatewayRequest) -> GatewayResponse {
        match request {
            GatewayRequest::Args(args) => self.analyze(AnalysisRequest::Args(args)).await,
            GatewayRequest::Encrypted(payload) => {
                self.analyze(AnalysisRequest::Encrypted(payload)).await
            }
            GatewayRequest::Probe(dsn) => match self.connection.test_connection(&dsn).await {
                Ok(()) => GatewayResponse {
                    ok: true,
                    ..GatewayResponse::default()
                },
                Err(e) => GatewayResponse::failure(&e, false),
            },
            GatewayRequest::Describe(source) => match self.connection.describe(&source).await {
                Ok(meta) => GatewayResponse {
                    ok: true,
                    meta: Some(meta),
                    ..GatewayResponse::default()
                },
                Err(e) => GatewayResponse::failure(&e, false),
            },
        }
    }

    async fn analyze(&self, request: AnalysisRequest) -> GatewayResponse {
        match self.analysis.analyze(request).await {
            Ok(output) => GatewayResponse {
                ok: true,
                stdout: Some(String::from_utf8_lossy(&output.stdout).into_owned()),
                loginfo: Some(String::from_utf8_lossy(&output.loginfo).into_owned()),
                ..GatewayResponse::default()
            },
            Err(e) => {
                warn!(error = %e, "Analysis request failed");
                GatewayResponse::failure(&e, true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use sg_core::security::hybrid::HybridDecryptor;
    use sg_core::soar::{SoarArgsAllowList, SoarRunner};

    fn gateway() -> Gateway {
        let allow_list: SoarArgsAllowList = ["report-type"].into_iter().collect();
        let runner = SoarRunner::new("/nonexistent/soar", Arc::new(allow_list));
        Gateway::new(
            AnalysisService::new(runner, HybridDecryptor::new("/nonexistent/private.rsa")),
            ConnectionService::new(Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn test_rejected_args_report_message_on_both_channels() {
        let request: GatewayRequest =
            serde_json::from_str(r#"{"args": {"online-dsn": "root@prod"}}"#).unwrap();
        let response = gateway().handle(request).await;

        assert!(!response.ok);
        let stdout = response.stdout.unwrap();
        assert!(stdout.contains("-online-dsn"));
        assert_eq!(response.loginfo.as_deref(), Some(stdout.as_str()));
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let request: GatewayRequest =
            serde_json::from_str(r#"{"args": {"report-type": "json"}}"#).unwrap();
        let response = gateway().handle(request).await;
        assert!(!response.ok);
        assert!(response.error.unwrap().contains("failed to start soar"));
    }

    #[tokio::test]
    async fn test_encrypted_request_without_key_file() {
        let request: GatewayRequest =
            serde_json::from_str(r#"{"encrypted": {"data": "AAAA", "key": "AAAA"}}"#).unwrap();
        let response = gateway().handle(request).await;
        assert!(!response.ok);
        assert!(response.error.unwrap().starts_with("Failed to decrypt request"));
    }

    #[tokio::test]
    async fn test_probe_failure_omits_output_channels() {
        let request: GatewayRequest = serde_json::from_str(r#"{"probe": "nonsense"}"#).unwrap();
        let response = gateway().handle(request).await;
        assert!(!response.ok);
        assert!(response.stdout.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("stdout").is_none());
        assert_eq!(json["ok"], false);
    }
}
