//! Argon2id password hashing with an optional server-side pepper.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};

use super::AuthError;

#[derive(Clone, Default)]
pub struct PasswordHasher {
    pepper: Option<Vec<u8>>,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("pepper", &self.pepper.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PasswordHasher {
    pub fn new(pepper: Option<&str>) -> Self {
        Self {
            pepper: pepper.map(|p| p.as_bytes().to_vec()),
        }
    }

    fn argon2(&self) -> Result<Argon2<'_>, AuthError> {
        match &self.pepper {
            Some(pepper) => Argon2::new_with_secret(
                pepper,
                Algorithm::Argon2id,
                Version::V0x13,
                Params::default(),
            )
            .map_err(|e| AuthError::Internal(format!("Failed to initialize Argon2: {}", e))),
            None => Ok(Argon2::new(
                Algorithm::Argon2id,
                Version::V0x13,
                Params::default(),
            )),
        }
    }

    /// Hash a password into a PHC string.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Internal(format!("Password hashing error: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Verify a password against a stored PHC string. Any mismatch or
    /// malformed hash is reported as invalid credentials.
    pub fn verify(&self, password: &str, stored: &str) -> Result<(), AuthError> {
        let parsed = PasswordHash::new(stored).map_err(|_| AuthError::InvalidCredentials)?;
        self.argon2()?
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hasher = PasswordHasher::new(None);
        let hash = hasher.hash("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse battery", &hash).is_ok());
        assert!(matches!(
            hasher.verify("wrong", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn pepper_is_required_to_verify() {
        let peppered = PasswordHasher::new(Some("server-pepper"));
        let hash = peppered.hash("hunter22").unwrap();
        assert!(peppered.verify("hunter22", &hash).is_ok());
        assert!(PasswordHasher::new(None).verify("hunter22", &hash).is_err());
    }

    #[test]
    fn malformed_hash_is_invalid_credentials() {
        let hasher = PasswordHasher::default();
        assert!(matches!(
            hasher.verify("x", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }
}
