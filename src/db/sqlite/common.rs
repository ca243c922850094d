use uuid::Uuid;

use crate::{
    db::error::{DbError, DbResult},
    models::Role,
};

/// Parse a UUID string from the database, returning a DbError on failure
pub fn parse_uuid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::Internal(format!("Invalid UUID in database: {}", e)))
}

/// Parse an optional UUID column
pub fn parse_opt_uuid(s: Option<String>) -> DbResult<Option<Uuid>> {
    s.as_deref().map(parse_uuid).transpose()
}

/// Parse a stored role name
pub fn parse_role(s: &str) -> DbResult<Role> {
    Role::parse(s).ok_or_else(|| DbError::Internal(format!("Invalid role in database: {}", s)))
}
