use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use tracing::debug;

use crate::probe::DbError;

/// `jdbc:mysql://host[:port]/database[?params]`; the `jdbc:` prefix is optional.
static MYSQL_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:jdbc:)?mysql://([\w.-]+)(?::(\d+))?/([\w-]+)(?:\?(.*))?$").unwrap()
});

const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Connection details for a target MySQL instance as supplied by a client.
#[derive(Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("url", &self.redacted_url())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl DataSource {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Validate the descriptor and turn it into driver connect options.
    ///
    /// JDBC query parameters are ignored except `useSSL`, which maps to the
    /// driver's SSL mode.
    pub fn connect_options(&self) -> Result<MySqlConnectOptions, DbError> {
        let url = self.url.trim();
        let caps = MYSQL_URL_RE.captures(url).ok_or_else(|| {
            DbError::InvalidDataSource(
                "URL must look like jdbc:mysql://host:port/dbname".to_string(),
            )
        })?;

        if self.username.trim().is_empty() {
            return Err(DbError::InvalidDataSource("username must not be blank".into()));
        }
        if self.password.trim().is_empty() {
            return Err(DbError::InvalidDataSource("password must not be blank".into()));
        }

        let host = &caps[1];
        let port = match caps.get(2) {
            Some(port) => port.as_str().parse::<u16>().map_err(|_| {
                DbError::InvalidDataSource(format!("invalid port: {}", port.as_str()))
            })?,
            None => DEFAULT_MYSQL_PORT,
        };
        let database = &caps[3];

        let mut options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .database(database)
            .username(&self.username)
            .password(&self.password);

        if let Some(params) = caps.get(4) {
            for (key, value) in params.as_str().split('&').filter_map(|p| p.split_once('=')) {
                match (key, value.to_ascii_lowercase().as_str()) {
                    ("useSSL", "false") => options = options.ssl_mode(MySqlSslMode::Disabled),
                    ("useSSL", "true") => options = options.ssl_mode(MySqlSslMode::Required),
                    _ => debug!(param = %key, "Ignoring JDBC URL parameter"),
                }
            }
        }

        Ok(options)
    }

    /// The URL without its query string, safe to log and echo back.
    pub fn redacted_url(&self) -> &str {
        let url = self.url.trim();
        url.split_once('?').map_or(url, |(base, _)| base)
    }
}

/// What a successful probe learned about the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMeta {
    pub database_product_name: String,
    pub database_version: String,
    pub driver_name: String,
    pub driver_version: String,
    pub user_name: String,
    pub connection_url: String,
    pub transaction_supported: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> DataSource {
        DataSource::new(url, "root", "s3cret")
    }

    #[test]
    fn test_accepts_jdbc_and_plain_urls() {
        assert!(source("jdbc:mysql://localhost:3306/test").connect_options().is_ok());
        assert!(source("mysql://db.internal/test_db").connect_options().is_ok());
        assert!(source("jdbc:mysql://10.0.0.5:3307/app-db?useSSL=false&serverTimezone=UTC")
            .connect_options()
            .is_ok());
    }

    #[test]
    fn test_rejects_malformed_urls() {
        for url in [
            "",
            "jdbc:postgresql://localhost:5432/test",
            "jdbc:mysql://localhost:3306/",
            "jdbc:mysql://local host:3306/test",
            "jdbc:mysql://localhost:99999/test",
            "jdbc:mysql://localhost:3306/test;DROP",
        ] {
            assert!(
                matches!(source(url).connect_options(), Err(DbError::InvalidDataSource(_))),
                "accepted {url:?}"
            );
        }
    }

    #[test]
    fn test_rejects_blank_credentials() {
        let blank_user = DataSource::new("jdbc:mysql://localhost/test", " ", "pw");
        assert!(blank_user.connect_options().is_err());
        let blank_password = DataSource::new("jdbc:mysql://localhost/test", "root", "");
        assert!(blank_password.connect_options().is_err());
    }

    #[test]
    fn test_redacted_url_drops_query() {
        let ds = source("jdbc:mysql://localhost:3306/test?user=root&password=s3cret");
        assert_eq!(ds.redacted_url(), "jdbc:mysql://localhost:3306/test");
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", source("jdbc:mysql://localhost/test"));
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("root"));
    }

    #[test]
    fn test_meta_serializes_camel_case() {
        let meta = DatabaseMeta {
            database_product_name: "MySQL".into(),
            database_version: "8.0.32".into(),
            driver_name: "sqlx-mysql".into(),
            driver_version: "0.8".into(),
            user_name: "root@%".into(),
            connection_url: "jdbc:mysql://localhost:3306/test".into(),
            transaction_supported: true,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["databaseProductName"], "MySQL");
        assert_eq!(json["transactionSupported"], true);
    }
}
