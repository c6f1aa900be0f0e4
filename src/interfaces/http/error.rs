use crate::error::EngineError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Engine(EngineError),
    /// The request body could not be read as the expected JSON.
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Engine(e) => match e {
                EngineError::InvalidWorkerCount { .. }
                | EngineError::ScaleDownUnsupported { .. }
                | EngineError::InvalidOrder(_)
                | EngineError::MalformedMessage(_) => StatusCode::BAD_REQUEST,
                EngineError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::InvalidTransition { .. } | EngineError::OrderInProgress(_) => {
                    StatusCode::CONFLICT
                }
                EngineError::Queue(_) | EngineError::PoolStopped | EngineError::GateClosed => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                EngineError::Config(_) | EngineError::Serialization(_) | EngineError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Engine(e) => e.to_string(),
            AppError::BadRequest(msg) => msg.clone(),
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("Invalid request: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;

    #[test]
    fn order_not_found_maps_to_404() {
        let response = AppError::from(EngineError::OrderNotFound("o-1".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn scale_down_maps_to_400() {
        let err = EngineError::ScaleDownUnsupported {
            current: 4,
            requested: 2,
        };
        assert_eq!(AppError::from(err).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn invalid_worker_count_maps_to_400() {
        let err = EngineError::InvalidWorkerCount {
            requested: 0,
            min: 1,
            max: 100,
        };
        assert_eq!(AppError::from(err).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn order_in_progress_maps_to_409() {
        let err = EngineError::OrderInProgress("o-2".into());
        assert_eq!(AppError::from(err).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn queue_failure_maps_to_503() {
        let err = EngineError::Queue(QueueError::Transient("down".into()));
        assert_eq!(AppError::from(err).status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn io_error_maps_to_500() {
        let err = EngineError::Io(std::io::Error::other("disk full"));
        assert_eq!(
            AppError::from(err).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_body_is_json() {
        let response = AppError::BadRequest("nope".into()).into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
