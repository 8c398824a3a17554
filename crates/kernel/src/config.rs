//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::listing::pager::DEFAULT_STATEMENT_TIMEOUT_SECS;
use crate::listing::search::{DEFAULT_MAX_SEARCH_LENGTH, DEFAULT_TEXT_SEARCH_CONFIG};
use crate::listing::service::{DEFAULT_PER_PAGE, MAX_PER_PAGE};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Path to the listing catalog (default: ./catalog.yml).
    pub catalog_path: PathBuf,

    /// Page size when neither request nor resource sets one (default: 20).
    pub listing_default_per_page: u32,

    /// Page size cap (default: 100).
    pub listing_max_per_page: u32,

    /// Search terms are cut to this many characters (default: 255).
    pub search_max_length: usize,

    /// PostgreSQL text search configuration for full-text columns (default: simple).
    pub text_search_config: String,

    /// Per-transaction statement timeout for listing queries, in seconds (default: 10).
    pub statement_timeout_secs: u64,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let catalog_path = env::var("CATALOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./catalog.yml"));

        let listing_default_per_page = env::var("LISTING_DEFAULT_PER_PAGE")
            .unwrap_or_else(|_| DEFAULT_PER_PAGE.to_string())
            .parse()
            .context("LISTING_DEFAULT_PER_PAGE must be a valid u32")?;

        let listing_max_per_page = env::var("LISTING_MAX_PER_PAGE")
            .unwrap_or_else(|_| MAX_PER_PAGE.to_string())
            .parse()
            .context("LISTING_MAX_PER_PAGE must be a valid u32")?;

        let search_max_length = env::var("SEARCH_MAX_LENGTH")
            .unwrap_or_else(|_| DEFAULT_MAX_SEARCH_LENGTH.to_string())
            .parse()
            .context("SEARCH_MAX_LENGTH must be a valid usize")?;

        let text_search_config = env::var("TEXT_SEARCH_CONFIG")
            .unwrap_or_else(|_| DEFAULT_TEXT_SEARCH_CONFIG.to_string());
        if !crate::listing::catalog::is_valid_identifier(&text_search_config) {
            anyhow::bail!("TEXT_SEARCH_CONFIG must be a plain identifier");
        }

        let statement_timeout_secs = env::var("STATEMENT_TIMEOUT")
            .unwrap_or_else(|_| DEFAULT_STATEMENT_TIMEOUT_SECS.to_string())
            .parse()
            .context("STATEMENT_TIMEOUT must be a whole number of seconds")?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            catalog_path,
            listing_default_per_page,
            listing_max_per_page,
            search_max_length,
            text_search_config,
            statement_timeout_secs,
            cors_allowed_origins,
        })
    }
}
