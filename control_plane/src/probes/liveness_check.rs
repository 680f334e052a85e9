use axum::http;
use axum::response::IntoResponse;
use problemdetails::Problem;
use tracing::instrument;

#[instrument(name = "probes::liveness_check")]
pub async fn liveness_check() -> impl IntoResponse {
    Problem::from(http::StatusCode::OK)
        .with_value("status", http::StatusCode::OK.as_u16())
        .with_title("Liveness Check")
        .with_detail("UP")
        .into_response()
}
