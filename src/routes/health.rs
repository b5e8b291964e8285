use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::query_scalar;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::AppResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    pub db_error: Option<String>,
    pub catalog_resources: usize,
    pub rate_limited_keys: usize,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Health check", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let db_check = query_scalar::<_, i64>("SELECT 1").fetch_one(&state.pool).await;
    let (db_ok, db_error) = match db_check {
        Ok(_) => (true, None),
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the database");
            (false, Some("database unreachable".to_string()))
        }
    };

    Ok(Json(HealthResponse {
        status: if db_ok { "ok" } else { "degraded" },
        db_ok,
        db_error,
        catalog_resources: state.catalog.len(),
        rate_limited_keys: state.limiter.tracked_keys().await,
    }))
}
