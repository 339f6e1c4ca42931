use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sg_core::config::GateConfig;
use sg_core::security::hybrid::{EncryptedPayload, HybridDecryptor};
use sg_core::soar::{ArgumentMap, SoarArgsAllowList, SoarOutput, SoarRunner};
use tracing::{debug, info};

use crate::error::ServiceError;

/// Parameters for one `soar` run, either in the clear or hybrid-encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisRequest {
    Args(ArgumentMap),
    Encrypted(EncryptedPayload),
}

/// Decrypts (when needed), gatekeeps and runs a single analysis request.
pub struct AnalysisService {
    runner: SoarRunner,
    decryptor: HybridDecryptor,
}

impl AnalysisService {
    pub fn new(runner: SoarRunner, decryptor: HybridDecryptor) -> Self {
        Self { runner, decryptor }
    }

    /// Discover the allow-list from the configured `soar` and wire up the service.
    pub async fn from_config(config: &GateConfig) -> Result<Self, ServiceError> {
        let allow_list = SoarArgsAllowList::discover(&config.soar_bin, config.help_timeout())
            .await?
            .with_deny_list(config.soar_args_deny_list.as_slice());

        info!(
            allowed = allow_list.allowed_flags().len(),
            denied = config.soar_args_deny_list.len(),
            "soar allow-list ready"
        );

        let mut runner = SoarRunner::new(config.soar_bin.clone(), Arc::new(allow_list))
            .with_timeout(config.soar_timeout());
        if let Some(dir) = &config.scratch_dir {
            runner = runner.with_scratch_dir(dir.clone());
        }

        Ok(Self::new(
            runner,
            HybridDecryptor::new(config.private_key_path.clone()),
        ))
    }

    pub fn runner(&self) -> &SoarRunner {
        &self.runner
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<SoarOutput, ServiceError> {
        let args = match request {
            AnalysisRequest::Args(args) => args,
            AnalysisRequest::Encrypted(payload) => {
                debug!("Decrypting request payload");
                self.decryptor.decrypt_args(&payload)?
            }
        };

        Ok(self.runner.run(&args).await?)
    }
}
