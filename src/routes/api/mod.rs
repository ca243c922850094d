//! Bearer-authenticated `/api/v1` routes.

pub mod courses;
pub mod error;
pub mod identities;
pub mod maintenance;
pub mod programs;
pub mod terms;

use axum::{
    Router,
    routing::{get, post, put},
};
use serde::Deserialize;

pub use error::ApiError;

use crate::{
    AppState,
    config::PaginationConfig,
    db::{ListParams, SortSpec},
    middleware::auth_middleware,
    routes::auth,
};

/// Paging and ordering accepted by every list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::IntoParams))]
#[serde(default)]
pub struct ListQuery {
    /// Zero-based page index
    pub page: Option<u32>,
    /// Page length, clamped to the configured maximum
    pub size: Option<u32>,
    /// Sort column; unknown columns fall back to the resource default
    pub sort: Option<String>,
    /// `asc` or `desc`
    #[serde(rename = "type")]
    pub order: Option<String>,
}

impl ListQuery {
    pub fn params(&self, spec: &SortSpec, pagination: &PaginationConfig) -> ListParams {
        ListParams::resolve(
            spec,
            self.page,
            self.size,
            self.sort.as_deref(),
            self.order.as_deref(),
            pagination.default_size,
            pagination.max_size,
        )
    }
}

pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/identities", get(identities::list).post(identities::create))
        .route(
            "/identities/{id}",
            get(identities::get)
                .patch(identities::update)
                .delete(identities::delete),
        )
        .route("/identities/{id}/role", put(identities::change_role))
        .route("/identities/{id}/active", put(identities::set_active))
        .route("/identities/{id}/programs", get(identities::programs))
        .route(
            "/maintenance/stale-profiles/purge",
            post(maintenance::purge_stale_profiles),
        )
        .route("/terms", get(terms::list).post(terms::create))
        .route(
            "/terms/{id}",
            get(terms::get).patch(terms::update).delete(terms::delete),
        )
        .route("/courses", get(courses::list).post(courses::create))
        .route(
            "/courses/{id}",
            get(courses::get).patch(courses::update).delete(courses::delete),
        )
        .merge(programs::routes())
        .route_layer(axum::middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .merge(protected)
}
