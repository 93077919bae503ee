//! Client configuration.
//!
//! Sources, lowest precedence first: an optional `account-client` file in the
//! working directory (any format the `config` crate understands), then
//! `ACCOUNT_*` environment variables. A `.env` file is loaded into the
//! environment beforehand if present.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::AccountError;

#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    pub server: String,
    pub access_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ClientConfig {
    pub fn new(server: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            access_token: access_token.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn load() -> Result<Self, AccountError> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("account-client").required(false))
            .add_source(Environment::with_prefix("ACCOUNT"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// `None` when `timeout_secs` is zero, meaning no deadline.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server", &self.server)
            .field("access_token", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn clear_env() {
        for key in ["ACCOUNT_SERVER", "ACCOUNT_ACCESS_TOKEN", "ACCOUNT_TIMEOUT_SECS"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn load_reads_prefixed_environment() {
        clear_env();
        std::env::set_var("ACCOUNT_SERVER", "https://account.example.com");
        std::env::set_var("ACCOUNT_ACCESS_TOKEN", "tok");
        std::env::set_var("ACCOUNT_TIMEOUT_SECS", "5");

        let config = ClientConfig::load().unwrap();
        clear_env();

        assert_eq!(config.server, "https://account.example.com");
        assert_eq!(config.access_token, "tok");
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    #[serial]
    fn load_defaults_timeout() {
        clear_env();
        std::env::set_var("ACCOUNT_SERVER", "http://localhost:3000");
        std::env::set_var("ACCOUNT_ACCESS_TOKEN", "tok");

        let config = ClientConfig::load().unwrap();
        clear_env();

        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn load_without_server_is_a_config_error() {
        clear_env();
        let err = ClientConfig::load().unwrap_err();
        assert!(matches!(err, AccountError::Config(_)));
    }

    #[test]
    fn zero_timeout_means_no_deadline() {
        let mut config = ClientConfig::new("http://localhost", "tok");
        config.timeout_secs = 0;
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn debug_redacts_token() {
        let config = ClientConfig::new("http://localhost", "super-secret");
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
