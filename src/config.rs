// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which document store backs the relationship and session collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local store for development and tests.
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Firestore => "firestore",
            StoreBackend::Memory => "memory",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND")),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// JWT signing key for bearer credentials (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    pub store_backend: StoreBackend,
    /// Prefix of every cache key
    pub cache_namespace: String,
    /// Lifetime of a cached query result
    pub cache_ttl: Duration,
    /// Attempts (including the first) for a chunked batch delete
    pub batch_retry_max_attempts: u32,
    /// Delay before the first retry; doubled on each further attempt
    pub batch_retry_base_delay: Duration,
    /// Page size used when scanning the whole relationship collection
    pub scan_page_size: u32,
    /// Also sweep the entire relationship collection on account purge
    pub purge_full_scan: bool,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            store_backend: StoreBackend::Memory,
            cache_namespace: "sessions".to_string(),
            cache_ttl: Duration::from_secs(300),
            batch_retry_max_attempts: 3,
            batch_retry_base_delay: Duration::from_millis(1),
            scan_page_size: 2,
            purge_full_scan: true,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080)?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .trim()
                .as_bytes()
                .to_vec(),
            store_backend: parse_or("STORE_BACKEND", StoreBackend::Firestore)?,
            cache_namespace: env::var("CACHE_NAMESPACE")
                .unwrap_or_else(|_| "sessions".to_string()),
            cache_ttl: Duration::from_secs(parse_or("CACHE_TTL_SECS", 300)?),
            batch_retry_max_attempts: parse_or("BATCH_RETRY_MAX_ATTEMPTS", 5)?,
            batch_retry_base_delay: Duration::from_millis(parse_or(
                "BATCH_RETRY_BASE_DELAY_MS",
                100,
            )?),
            scan_page_size: parse_or("SCAN_PAGE_SIZE", 200)?,
            purge_full_scan: parse_or("PURGE_FULL_SCAN", true)?,
        })
    }
}

/// Parse an optional variable, falling back to `default` when it is unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
