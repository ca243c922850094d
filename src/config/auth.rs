use std::fmt;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Minimum HS256 secret length in bytes.
const MIN_JWT_SECRET_BYTES: usize = 32;

/// Authentication configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Shared secret used to sign and verify access tokens (HS256).
    #[serde(default)]
    pub jwt_secret: String,

    /// `iss` claim written into issued tokens and required on verification.
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Optional pepper mixed into password hashes as the Argon2 secret.
    /// Changing it invalidates every stored password.
    #[serde(default)]
    pub password_pepper: Option<String>,

    /// Allow unauthenticated self-registration of STUDENT identities.
    #[serde(default = "default_true")]
    pub registration_enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: default_issuer(),
            password_pepper: None,
            registration_enabled: true,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"****")
            .field("issuer", &self.issuer)
            .field(
                "password_pepper",
                &self.password_pepper.as_ref().map(|_| "****"),
            )
            .field("registration_enabled", &self.registration_enabled)
            .finish()
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::Validation(format!(
                "auth.jwt_secret must be at least {} bytes",
                MIN_JWT_SECRET_BYTES
            )));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Validation(
                "auth.issuer cannot be empty".into(),
            ));
        }
        if self.password_pepper.as_deref() == Some("") {
            return Err(ConfigError::Validation(
                "auth.password_pepper cannot be empty; omit it instead".into(),
            ));
        }
        Ok(())
    }
}

fn default_issuer() -> String {
    "registrar".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secret_is_rejected() {
        let config = AuthConfig {
            jwt_secret: "too-short".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AuthConfig {
            jwt_secret: "x".repeat(40),
            password_pepper: Some("pepper-value".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("xxxx"));
        assert!(!debug.contains("pepper-value"));
    }
}
