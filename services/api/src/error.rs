use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use photobooth_core::dialogue::UnknownAction;
use photobooth_core::planner::PlannerError;
use serde_json::json;

/// Errors a handler can surface to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error("Downstream service failed: {0:#}")]
    Upstream(anyhow::Error),
}

impl From<UnknownAction> for ApiError {
    fn from(err: UnknownAction) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Planner(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed with {status}: {self}");
        } else {
            tracing::warn!("Rejected request: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(UnknownAction("dance".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(PlannerError::UnknownPrompt("X".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Upstream(anyhow::anyhow!("Status Code: 403")).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
