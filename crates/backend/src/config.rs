//! Backend configuration loaded from environment variables.

/// Connection settings for the deployable backend bindings.
///
/// Reads from environment variables:
/// - `DATABASE_URL` — Postgres connection string for the record store
///   (default: `"postgres://localhost/storefront"`)
/// - `STORAGE_PUBLIC_URL` — base URL for object store public links
///   (default: `"http://localhost:9000"`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub database_url: String,
    pub storage_public_url: String,
    pub log_level: String,
}

impl BackendConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/storefront".to_string()),
            storage_public_url: std::env::var("STORAGE_PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/storefront".to_string(),
            storage_public_url: "http://localhost:9000".to_string(),
            log_level: "info".to_string(),
        }
    }
}
