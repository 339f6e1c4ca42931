use std::str::FromStr;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use thiserror::Error;
use tracing::{info, warn};

use crate::datasource::{DataSource, DatabaseMeta};

const DRIVER_NAME: &str = "sqlx-mysql";
const DRIVER_VERSION: &str = "0.8";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Invalid DSN: {0}")]
    InvalidDsn(#[source] sqlx::Error),
    #[error("Invalid data source: {0}")]
    InvalidDataSource(String),
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),
    #[error("Database did not answer within {0:?}")]
    Timeout(Duration),
}

/// URL schemes `probe` accepts.
const DSN_SCHEMES: &[&str] = &["mysql://", "mariadb://"];

/// Open a single connection to `dsn`, ping it and close it.
///
/// `dsn` must be a URL (`mysql://user:pw@host:3306/db`). go-sql-driver style
/// DSNs as sent by soar-web clients (`user:pw@tcp(host:3306)/db`) are not
/// understood and fail with [`DbError::InvalidDsn`] before any connect.
///
/// `Ok(())` means the server accepted the connection and answered the ping.
/// The connection is closed whether or not the ping succeeds; there is no retry.
pub async fn probe(dsn: &str, timeout: Duration) -> Result<(), DbError> {
    let options = parse_dsn(dsn)?;
    probe_options(&options, timeout).await
}

fn parse_dsn(dsn: &str) -> Result<MySqlConnectOptions, DbError> {
    let dsn = dsn.trim();
    if !DSN_SCHEMES.iter().any(|scheme| dsn.starts_with(scheme)) {
        return Err(DbError::InvalidDsn(sqlx::Error::Configuration(
            "DSN must be a mysql:// URL".into(),
        )));
    }
    MySqlConnectOptions::from_str(dsn).map_err(DbError::InvalidDsn)
}

pub(crate) async fn probe_options(
    options: &MySqlConnectOptions,
    timeout: Duration,
) -> Result<(), DbError> {
    let check = async {
        let mut conn = MySqlConnection::connect_with(options).await?;
        let ping = conn.ping().await;
        let close = conn.close().await;
        ping?;
        close?;
        Ok::<_, sqlx::Error>(())
    };

    match tokio::time::timeout(timeout, check).await {
        Ok(Ok(())) => {
            info!("Database probe succeeded");
            Ok(())
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Database probe failed");
            Err(DbError::Connection(e))
        }
        Err(_) => {
            warn!(timeout = ?timeout, "Database probe timed out");
            Err(DbError::Timeout(timeout))
        }
    }
}

/// Connect to `source`, run `SELECT 1` and report server metadata.
pub async fn probe_with_metadata(
    source: &DataSource,
    timeout: Duration,
) -> Result<DatabaseMeta, DbError> {
    let options = source.connect_options()?;

    let check = async {
        let mut conn = MySqlConnection::connect_with(&options).await?;
        let result = read_server_info(&mut conn).await;
        let close = conn.close().await;
        let info = result?;
        close?;
        Ok::<_, sqlx::Error>(info)
    };

    let (version, user, engine) = tokio::time::timeout(timeout, check)
        .await
        .map_err(|_| DbError::Timeout(timeout))??;

    info!(url = %source.redacted_url(), version = %version, "Database metadata probe succeeded");

    Ok(DatabaseMeta {
        database_product_name: product_name(&version).to_string(),
        database_version: version,
        driver_name: DRIVER_NAME.to_string(),
        driver_version: DRIVER_VERSION.to_string(),
        user_name: user,
        connection_url: source.redacted_url().to_string(),
        transaction_supported: engine.eq_ignore_ascii_case("InnoDB"),
    })
}

async fn read_server_info(
    conn: &mut MySqlConnection,
) -> Result<(String, String, String), sqlx::Error> {
    sqlx::query("SELECT 1").execute(&mut *conn).await?;
    sqlx::query_as("SELECT VERSION(), CURRENT_USER(), @@default_storage_engine")
        .fetch_one(&mut *conn)
        .await
}

fn product_name(version: &str) -> &'static str {
    if version.to_ascii_lowercase().contains("mariadb") {
        "MariaDB"
    } else {
        "MySQL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_malformed_dsn_is_rejected() {
        let result = probe("definitely not a dsn", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(DbError::InvalidDsn(_))));
    }

    #[tokio::test]
    async fn test_go_driver_dsn_is_rejected() {
        let result = probe("root:pw@tcp(127.0.0.1:3306)/test", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(DbError::InvalidDsn(_))));
    }

    #[test]
    fn test_parse_dsn_accepts_url_schemes() {
        assert!(parse_dsn("mysql://root:pw@localhost:3306/test").is_ok());
        assert!(parse_dsn(" mariadb://root@localhost/test\n").is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails() {
        // Port 1 on loopback is closed, so the connect is refused immediately.
        let result = probe("mysql://root:pw@127.0.0.1:1/test", Duration::from_secs(5)).await;
        assert!(matches!(
            result,
            Err(DbError::Connection(_)) | Err(DbError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_metadata_probe_validates_before_connecting() {
        let source = DataSource::new("jdbc:oracle:thin:@localhost:1521:xe", "scott", "tiger");
        let result = probe_with_metadata(&source, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(DbError::InvalidDataSource(_))));
    }

    #[test]
    fn test_product_name() {
        assert_eq!(product_name("8.0.32"), "MySQL");
        assert_eq!(product_name("10.11.6-MariaDB-0+deb12u1"), "MariaDB");
    }
}
