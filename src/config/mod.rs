//! Configuration for the registrar service.
//!
//! The service is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [database]
//! type = "sqlite"
//! path = "registrar.db"
//!
//! [auth]
//! jwt_secret = "${REGISTRAR_JWT_SECRET}"
//! ```

mod auth;
mod database;
mod observability;
mod pagination;
mod server;

use std::path::Path;

pub use auth::*;
pub use database::*;
pub use observability::*;
pub use pagination::*;
use serde::{Deserialize, Serialize};
pub use server::*;

/// Root configuration.
///
/// Every section is optional, but `[database]` and `auth.jwt_secret` must be
/// set before the server will start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrarConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database holding identities and the enrollment graph.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Token signing and password hashing.
    #[serde(default)]
    pub auth: AuthConfig,

    /// List endpoint defaults.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Logging.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl RegistrarConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        // Catch backends that were compiled out before serde reports an
        // opaque "unknown variant".
        let raw: toml::Value = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        check_disabled_features(&raw)?;

        let config: RegistrarConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.is_none() {
            return Err(ConfigError::Validation(
                "A [database] section is required".into(),
            ));
        }

        self.database.validate()?;
        self.auth.validate()?;
        self.pagination.validate()?;

        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

fn check_disabled_features(raw: &toml::Value) -> Result<(), ConfigError> {
    let mut issues: Vec<(String, &str)> = Vec::new();

    if let Some(type_val) = raw
        .get("database")
        .and_then(|v| v.get("type"))
        .and_then(|v| v.as_str())
    {
        check_database_feature(type_val, &mut issues);
    }

    if issues.is_empty() {
        return Ok(());
    }

    let details = issues
        .iter()
        .map(|(msg, _)| msg.as_str())
        .collect::<Vec<_>>()
        .join("\n  - ");
    let features = issues
        .iter()
        .map(|(_, feat)| *feat)
        .collect::<Vec<_>>()
        .join(",");

    Err(ConfigError::Validation(format!(
        "Configuration requires features not compiled in this build:\n  \
         - {details}\n\n\
         Rebuild with: cargo build --features {features}"
    )))
}

fn check_database_feature(type_val: &str, _issues: &mut Vec<(String, &str)>) {
    match type_val {
        #[cfg(not(feature = "database-sqlite"))]
        "sqlite" => _issues.push((
            "database type 'sqlite' requires the 'database-sqlite' feature".into(),
            "database-sqlite",
        )),
        #[cfg(not(feature = "database-postgres"))]
        "postgres" => _issues.push((
            "database type 'postgres' requires the 'database-postgres' feature".into(),
            "database-postgres",
        )),
        _ => {}
    }
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables after a `#` on the same line are left alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut rest = line;
        let mut offset = 0;

        while let Some(start) = rest.find("${") {
            let absolute = offset + start;
            if comment_pos.is_some_and(|pos| absolute >= pos) {
                break;
            }
            let Some(len) = rest[start + 2..].find('}') else {
                break;
            };
            let var_name = &rest[start + 2..start + 2 + len];
            if var_name.is_empty() {
                break;
            }

            result.push_str(&rest[..start]);
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            let consumed = start + 2 + len + 1;
            rest = &rest[consumed..];
            offset += consumed;
        }

        result.push_str(rest);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
