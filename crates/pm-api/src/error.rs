//! HTTP mapping of `AppError`.

use std::fmt;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use pm_core::AppError;
use serde_json::json;

/// Handler error wrapper; `AppError` lives in pm-core so the actix trait is
/// implemented here.
#[derive(Debug)]
pub struct ApiError(pub AppError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError(AppError::InvalidInput(message.into()))
    }

    /// Message safe to show to clients. Internal failures are reduced to a
    /// generic text; the full chain only goes to the log.
    fn public_message(&self) -> String {
        match &self.0 {
            AppError::Store(_) | AppError::Internal(_) => "internal server error".to_string(),
            AppError::InvariantViolation(_) => {
                "payment received but could not be applied; support has been notified".to_string()
            }
            AppError::Gateway(_) => "payment provider unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            AppError::NotFound(..) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientInventory { .. } => StatusCode::CONFLICT,
            AppError::DuplicateLink { .. } => StatusCode::CONFLICT,
            AppError::AlreadyProcessed(_) => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{} {}: {}", status.as_u16(), self.0.category(), self.0);
        }

        let mut error = json!({
            "code": status.as_u16(),
            "type": self.0.category(),
            "message": self.public_message(),
        });
        if let AppError::DuplicateLink { link, existing } = &self.0 {
            error["link"] = json!(link);
            error["existingPost"] = json!(existing);
        }

        HttpResponse::build(status).json(json!({ "error": error }))
    }
}
