use anyhow::{Context, Result};
use sg_core::config::GateConfig;
use sg_services::gateway::{Gateway, GatewayRequest};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal;
use tracing::{info, warn};

/// Handle one request read from stdin and write the response to stdout.
///
/// The allow-list is discovered before stdin is read. An interrupt while the
/// request is in flight drops it, which kills any running `soar` child.
pub async fn run() -> Result<()> {
    let config = GateConfig::load().context("Failed to load configuration")?;

    let gateway = Gateway::from_config(&config)
        .await
        .context("Failed to initialize soar gatekeeper")?;

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read request from stdin")?;
    let request = parse_request(&input)?;

    let response = tokio::select! {
        response = gateway.handle(request) => response,
        _ = shutdown_signal() => {
            warn!("Request abandoned on shutdown");
            return Ok(());
        }
    };

    let mut body = serde_json::to_vec(&response).context("Failed to encode response")?;
    body.push(b'\n');

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(&body)
        .await
        .context("Failed to write response")?;
    stdout.flush().await.context("Failed to flush response")?;

    info!(ok = response.ok, "Request handled");
    Ok(())
}

fn parse_request(input: &str) -> Result<GatewayRequest> {
    serde_json::from_str(input.trim()).context("Request is not a valid gateway request")
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, abandoning request");
        }
        _ = terminate => {
            info!("Received SIGTERM, abandoning request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_variants() {
        assert!(matches!(
            parse_request(r#"{"args": {"query": "SELECT 1"}}"#).unwrap(),
            GatewayRequest::Args(_)
        ));
        assert!(matches!(
            parse_request("{\"probe\": \"mysql://root:pw@localhost/test\"}\n").unwrap(),
            GatewayRequest::Probe(_)
        ));
        assert!(matches!(
            parse_request(
                r#"{"describe": {"url": "jdbc:mysql://localhost:3306/test", "username": "root", "password": "pw"}}"#
            )
            .unwrap(),
            GatewayRequest::Describe(_)
        ));
    }

    #[test]
    fn test_parse_request_rejects_unknown_shape() {
        assert!(parse_request(r#"{"query": "SELECT 1"}"#).is_err());
        assert!(parse_request("").is_err());
    }
}
