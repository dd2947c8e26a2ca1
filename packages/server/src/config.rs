use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub openai_api_key: String,
    pub openai_model: Option<String>,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub query_timeout_ms: u64,
    pub sync_page_size: u32,
    pub sync_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            openai_api_key: env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set")?,
            openai_model: env::var("OPENAI_MODEL").ok(),
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .context("GOOGLE_CLIENT_ID must be set")?,
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .context("GOOGLE_CLIENT_SECRET must be set")?,
            jwt_secret: env::var("JWT_SECRET")
                .context("JWT_SECRET must be set")?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "email2kg".to_string()),
            query_timeout_ms: env::var("QUERY_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .context("QUERY_TIMEOUT_MS must be a valid number")?,
            sync_page_size: env::var("SYNC_PAGE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("SYNC_PAGE_SIZE must be a valid number")?,
            sync_concurrency: env::var("SYNC_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("SYNC_CONCURRENCY must be a valid number")?,
        })
    }
}
