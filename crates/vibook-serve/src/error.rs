use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use vibook_vqa::VqaError;

/// An error returned to the client as `{"detail": <message>}`.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Model is not available. Please check server logs.")]
    ModelUnavailable,

    /// The request body was refused by an extractor, with the status it chose.
    #[error("{1}")]
    Rejected(StatusCode, String),

    #[error("{0}")]
    InvalidForm(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Rejected(status, _) => *status,
            ApiError::InvalidForm(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<VqaError> for ApiError {
    fn from(e: VqaError) -> Self {
        match e {
            VqaError::ModelUnavailable => ApiError::ModelUnavailable,
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self {
        ApiError::Rejected(e.status(), e.body_text())
    }
}

// a body over the upload limit surfaces here as 413
impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Rejected(e.status(), e.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ApiError::ModelUnavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::InvalidForm("Field required: image".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Rejected(StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded".into()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(VqaError::ModelUnavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(VqaError::EmptyPrompt).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
