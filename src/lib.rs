//! Registrar: role-hierarchical identities and the program enrollment graph.

pub mod auth;
pub mod authz;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
#[cfg(feature = "server")]
pub mod observability;
pub mod openapi;
pub mod routes;
pub mod services;

#[cfg(test)]
mod tests;

use std::sync::Arc;

#[cfg(feature = "utoipa")]
use axum::Json;
use axum::{Router, routing::get};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{
    auth::{CredentialVerifier, JwtCodec, PasswordHasher, TokenIssuer},
    config::RegistrarConfig,
    db::DbPool,
    services::Services,
};

/// Shared request state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RegistrarConfig>,
    pub db: Arc<DbPool>,
    pub services: Services,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub issuer: Arc<dyn TokenIssuer>,
}

impl AppState {
    /// Wire the services and the default JWT credential handling.
    pub fn new(config: RegistrarConfig, db: DbPool) -> Self {
        let config = Arc::new(config);
        let db = Arc::new(db);
        let hasher = PasswordHasher::new(config.auth.password_pepper.as_deref());
        let codec = Arc::new(JwtCodec::from_config(&config.auth));

        Self {
            services: Services::new(Arc::clone(&db), hasher),
            verifier: codec.clone(),
            issuer: codec,
            config,
            db,
        }
    }
}

pub fn build_app(config: &RegistrarConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness));

    #[cfg(feature = "utoipa")]
    {
        app = app.route("/openapi.json", get(openapi_json));
    }

    app = app
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware));

    if let Some(cors_layer) = config.server.cors.clone().into_layer() {
        app = app.layer(cors_layer);
    }

    app.layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}

#[cfg(feature = "utoipa")]
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    Json(openapi::ApiDoc::openapi())
}
