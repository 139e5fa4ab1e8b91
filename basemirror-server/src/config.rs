//! Server configuration from environment variables.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: String,
    /// Shared secret for the webhook endpoint. None = webhook rejects all
    /// requests with a configuration error.
    pub webhook_secret: Option<String>,
    pub leaderboard: LeaderboardConfig,
}

/// Credentials for the leaderboard API proxy. The proxy is optional: with
/// incomplete configuration the customers endpoint reports a config error
/// instead of the server refusing to start.
#[derive(Debug, Clone)]
pub struct LeaderboardConfig {
    pub base_url: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LeaderboardConfig {
    pub fn is_complete(&self) -> bool {
        self.base_url.is_some() && self.email.is_some() && self.password.is_some()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string()),
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            webhook_secret: std::env::var("WEBHOOK_SECRET").ok(),
            leaderboard: LeaderboardConfig {
                base_url: std::env::var("LEADERBOARD_API_BASE_URL").ok(),
                email: std::env::var("LEADERBOARD_API_EMAIL").ok(),
                password: std::env::var("LEADERBOARD_API_PASSWORD").ok(),
            },
        })
    }
}
