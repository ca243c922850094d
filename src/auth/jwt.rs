//! Bearer token issuing and verification (HS256).

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthError;
use crate::config::AuthConfig;

/// Fixed validity window of issued tokens.
pub const TOKEN_VALIDITY_HOURS: i64 = 24;

/// Claims carried by an issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (identity ID)
    pub sub: String,
    /// Role name at issue time
    pub role: String,
    pub handle: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// What a successfully verified credential yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub subject_id: Uuid,
    pub role: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Validates a bearer credential.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedCredential, AuthError>;
}

/// Issues bearer credentials valid for [`TOKEN_VALIDITY_HOURS`].
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, subject_id: Uuid, role: &str, handle: &str) -> Result<IssuedToken, AuthError>;
}

/// Symmetric-key JWT codec implementing both sides.
pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtCodec {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.as_bytes(), config.issuer.clone())
    }

    fn issue_at(
        &self,
        now: DateTime<Utc>,
        subject_id: Uuid,
        role: &str,
        handle: &str,
    ) -> Result<IssuedToken, AuthError> {
        let expires_at = now + Duration::hours(TOKEN_VALIDITY_HOURS);
        let claims = TokenClaims {
            sub: subject_id.to_string(),
            role: role.to_string(),
            handle: handle.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign token: {}", e)))?;
        Ok(IssuedToken { token, expires_at })
    }
}

impl TokenIssuer for JwtCodec {
    fn issue(&self, subject_id: Uuid, role: &str, handle: &str) -> Result<IssuedToken, AuthError> {
        self.issue_at(Utc::now(), subject_id, role, handle)
    }
}

impl CredentialVerifier for JwtCodec {
    fn verify(&self, token: &str) -> Result<VerifiedCredential, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Token validation failed");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            }
        })?;
        let claims = data.claims;

        let subject_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let issued_at = Utc
            .timestamp_opt(claims.iat, 0)
            .single()
            .ok_or(AuthError::InvalidToken)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(AuthError::InvalidToken)?;

        Ok(VerifiedCredential {
            subject_id,
            role: claims.role,
            issued_at,
            expires_at,
        })
    }
}
