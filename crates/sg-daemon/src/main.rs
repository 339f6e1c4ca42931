mod driver;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries the JSON response.
    // Use RUST_LOG env var to control log levels, defaulting to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("soar gateway starting");

    if let Err(e) = driver::run().await {
        error!("Gateway exited with error: {:#}", e);
        std::process::exit(1);
    }

    info!("soar gateway stopped");
}
