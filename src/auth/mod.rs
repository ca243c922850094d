mod actor;
mod error;
pub mod jwt;
mod password;

pub use actor::Actor;
pub use error::AuthError;
pub use jwt::{CredentialVerifier, IssuedToken, JwtCodec, TokenIssuer, VerifiedCredential};
pub use password::PasswordHasher;
