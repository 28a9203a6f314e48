pub mod analyze;
pub mod games;
pub mod health;

use analysis_worker::Depth;
use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::AppError;

/// Validate an optional client depth, falling back to `default`.
pub(crate) fn depth_or(depth: Option<i64>, default: u8) -> Result<Depth, AppError> {
    Ok(Depth::new(depth.unwrap_or(default as i64))?)
}

/// Unwrap a JSON body, reporting malformed input in the API's error format.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(format!("Invalid request body: {}", rejection.body_text())))
}
