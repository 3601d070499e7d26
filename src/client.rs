use crate::error::{Error, Result};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use url::Url;

/// Create the HTTP client used for identity and service requests,
/// with connection pooling and timeouts taken from `config`
pub fn create_http_client(config: &Config) -> Result<Client> {
    ClientBuilder::new()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(Error::from)
}

/// Configuration for the request pipeline.
///
/// Passed explicitly to everything that needs it; there is no process-wide
/// default, so differently configured clients can coexist.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the identity service (e.g. `https://identity.example/v2.0`)
    pub identity_url: Url,
    /// Total request timeout
    pub timeout: Duration,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
    /// User-Agent header sent on every request
    pub user_agent: String,
    /// Tokens expiring within this window are refreshed before use
    pub token_refresh_margin: Duration,
}

impl Config {
    /// Create a new configuration for the given identity service
    pub fn new(identity_url: Url) -> Self {
        Config {
            identity_url,
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 50,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            token_refresh_margin: Duration::from_secs(60),
        }
    }

    /// Create a configuration from `OS_AUTH_URL`
    pub fn from_env() -> Result<Self> {
        let raw = std::env::var("OS_AUTH_URL")
            .map_err(|_| Error::Config("OS_AUTH_URL is not set".to_string()))?;
        Ok(Config::new(Url::parse(&raw)?))
    }

    /// Set the total request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the User-Agent header
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set how long before expiry a cached token is considered stale
    pub fn with_token_refresh_margin(mut self, margin: Duration) -> Self {
        self.token_refresh_margin = margin;
        self
    }

    /// URL of the identity `tokens` resource
    pub fn tokens_url(&self) -> Result<Url> {
        let base = self.identity_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}/tokens", base))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::new(Url::parse("https://identity.example/v2.0").unwrap());
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.token_refresh_margin, Duration::from_secs(60));
        assert!(config.user_agent.starts_with("osclient/"));
    }

    #[test]
    fn test_tokens_url() {
        for base in ["https://identity.example/v2.0", "https://identity.example/v2.0/"] {
            let config = Config::new(Url::parse(base).unwrap());
            assert_eq!(
                config.tokens_url().unwrap().as_str(),
                "https://identity.example/v2.0/tokens"
            );
        }
    }

    #[test]
    fn test_create_http_client() {
        let config = Config::new(Url::parse("http://localhost:5000/v2.0").unwrap())
            .with_timeout(Duration::from_secs(5));
        assert!(create_http_client(&config).is_ok());
    }
}
