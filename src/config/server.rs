use std::net::IpAddr;

use http::{HeaderName, Method};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// `[server]`: listener address, body limit and CORS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address. Defaults to all interfaces.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Bulk enrollment is the largest payload; 1 MiB fits several thousand ids.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            cors: CorsConfig::default(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    1024 * 1024
}

/// `[server.cors]`, for browser front-ends served from another origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    #[serde(default = "default_cors_enabled")]
    pub enabled: bool,

    /// Exact origins, or `["*"]`. Empty means no cross-origin access.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_cors_methods")]
    pub allowed_methods: Vec<String>,

    /// `authorization` must stay listed for bearer tokens to pass preflight.
    #[serde(default = "default_cors_headers")]
    pub allowed_headers: Vec<String>,

    /// Preflight cache lifetime.
    #[serde(default = "default_cors_max_age")]
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_cors_enabled(),
            allowed_origins: vec![],
            allowed_methods: default_cors_methods(),
            allowed_headers: default_cors_headers(),
            max_age_secs: default_cors_max_age(),
        }
    }
}

impl CorsConfig {
    /// `None` when disabled. Unparseable entries are logged and skipped.
    pub fn into_layer(self) -> Option<CorsLayer> {
        if !self.enabled {
            tracing::debug!("CORS is disabled");
            return None;
        }

        let allow_origin = if self.allowed_origins.len() == 1 && self.allowed_origins[0] == "*" {
            tracing::warn!(
                "CORS allows any origin; bearer tokens are still required for every API route"
            );
            AllowOrigin::any()
        } else {
            let origins: Vec<http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!(origin = %origin, "Invalid CORS origin, skipping");
                        None
                    })
                })
                .collect();
            AllowOrigin::list(origins)
        };

        let methods: Vec<Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| {
                m.parse().ok().or_else(|| {
                    tracing::warn!(method = %m, "Invalid CORS method, skipping");
                    None
                })
            })
            .collect();

        let headers: Vec<HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| {
                h.parse().ok().or_else(|| {
                    tracing::warn!(header = %h, "Invalid CORS header, skipping");
                    None
                })
            })
            .collect();

        Some(
            CorsLayer::new()
                .allow_origin(allow_origin)
                .allow_methods(AllowMethods::list(methods))
                .allow_headers(AllowHeaders::list(headers))
                .max_age(std::time::Duration::from_secs(self.max_age_secs)),
        )
    }
}

fn default_cors_enabled() -> bool {
    true
}

fn default_cors_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_cors_headers() -> Vec<String> {
    ["authorization", "content-type", "x-request-id"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_cors_max_age() -> u64 {
    3600
}
