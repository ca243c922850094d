use axum::{Extension, Json, extract::State};
use serde::Deserialize;
use uuid::Uuid;

use super::ApiError;
use crate::{AppState, auth::Actor, models::StaleProfilePurge};

/// Restrict the sweep to one identity; omit to sweep everyone.
#[derive(Debug, Default, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct PurgeStaleProfiles {
    pub identity_id: Option<Uuid>,
}

/// Delete specialization rows that no longer match the identity's role
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/v1/maintenance/stale-profiles/purge",
    tag = "maintenance",
    operation_id = "maintenance_purge_stale_profiles",
    request_body(content = Option<PurgeStaleProfiles>),
    responses(
        (status = 200, description = "Rows removed", body = StaleProfilePurge),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.maintenance.purge_stale_profiles", skip(state, actor, input))]
pub async fn purge_stale_profiles(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    input: Option<Json<PurgeStaleProfiles>>,
) -> Result<Json<StaleProfilePurge>, ApiError> {
    let identity_id = input.and_then(|Json(body)| body.identity_id);
    Ok(Json(
        state
            .services
            .identities
            .purge_stale_profiles(&actor, identity_id)
            .await?,
    ))
}
