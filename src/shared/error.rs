use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for the support engine. Authorization and validation
/// variants surface to the caller; store failures are server errors.
#[derive(Debug, Error)]
pub enum SupportError {
    #[error("authentication required")]
    Unauthorized,

    #[error("you do not have access to this ticket")]
    Forbidden,

    #[error("ticket not found")]
    TicketNotFound,

    #[error("unknown conversation state: {0}")]
    UnknownState(String),

    #[error("option '{option_id}' is not available at state '{state_key}'")]
    InvalidOption {
        state_key: String,
        option_id: String,
    },

    #[error("invalid ticket status: {0}")]
    InvalidStatus(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("conversation has moved past state '{expected}'")]
    StaleState { expected: String },

    #[error("storage error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SupportError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::TicketNotFound => StatusCode::NOT_FOUND,
            Self::UnknownState(_) | Self::InvalidOption { .. } | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidStatus(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::StaleState { .. } => StatusCode::CONFLICT,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SupportError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("support engine failure: {self}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<diesel::result::Error> for SupportError {
    fn from(e: diesel::result::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for SupportError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Store(format!("connection pool: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(SupportError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(SupportError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            SupportError::InvalidStatus("junk".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            SupportError::StaleState { expected: "start".into() }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            SupportError::Store("down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
