use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Defaults applied to list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaginationConfig {
    /// Page size when the request omits `size`.
    #[serde(default = "default_size")]
    pub default_size: u32,

    /// Upper bound for a requested `size`.
    #[serde(default = "default_max_size")]
    pub max_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_size: default_size(),
            max_size: default_max_size(),
        }
    }
}

impl PaginationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_size == 0 || self.max_size == 0 {
            return Err(ConfigError::Validation(
                "pagination sizes must be positive".into(),
            ));
        }
        if self.default_size > self.max_size {
            return Err(ConfigError::Validation(
                "pagination.default_size cannot exceed pagination.max_size".into(),
            ));
        }
        Ok(())
    }
}

fn default_size() -> u32 {
    20
}

fn default_max_size() -> u32 {
    100
}
