use analysis_worker::AnalysisError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),

    /// No evaluator could be started
    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Validation(_) | AnalysisError::IllegalMove { .. } => {
                AppError::BadRequest(err.to_string())
            }
            AnalysisError::SchedulerExhaustion(_) => AppError::Unavailable(err.to_string()),
            AnalysisError::Evaluator { .. } => AppError::Internal(format!("Analysis failed: {err}")),
            AnalysisError::Config(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Unavailable(msg) => {
                tracing::error!("Evaluator unavailable: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Anyhow(e) => {
                tracing::error!("Unexpected error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_worker::EvaluatorFailure;

    #[test]
    fn test_analysis_error_status() {
        let cases = [
            (AnalysisError::Validation("Depth must be between 1 and 25".into()), StatusCode::BAD_REQUEST),
            (
                AnalysisError::IllegalMove { ply: 2, san: "Nf9".into() },
                StatusCode::BAD_REQUEST,
            ),
            (
                AnalysisError::Evaluator {
                    fen: "x".into(),
                    source: EvaluatorFailure::Engine("crash".into()),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AnalysisError::SchedulerExhaustion("spawn failed".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
