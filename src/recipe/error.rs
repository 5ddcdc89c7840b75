//! Step errors

use axum::http::StatusCode;

/// Failure reported by a step, or by the recipe itself
///
/// The first error raised while cooking is stored in the workplan under
/// [`keys::ERROR`](super::keys::ERROR) before the error steps run.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Missing ingredient '{name}' ({type_name})")]
    MissingIngredient { name: String, type_name: &'static str },

    #[error("Ingredient '{name}' is not a {type_name}")]
    WrongIngredientType { name: String, type_name: &'static str },

    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    #[error("Too many jumps while cooking recipe '{0}'")]
    JumpLimit(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StepError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::TooManyRequests(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine readable code, as found in JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::TooManyRequests(_) => "RATE_LIMIT",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to a visitor; server errors stay in the logs
    pub fn public_message(&self) -> String {
        if self.status().is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(StepError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(StepError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(StepError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(StepError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(StepError::too_many_requests("x").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(StepError::too_many_requests("x").code(), "RATE_LIMIT");
        assert_eq!(
            StepError::UnknownStep("render".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_public_message_hides_internal_errors() {
        let error = StepError::from(anyhow::anyhow!("database is locked"));
        assert_eq!(error.public_message(), "Internal server error");
        assert_eq!(error.code(), "INTERNAL_ERROR");

        let error = StepError::not_found("Content not found");
        assert_eq!(error.public_message(), "Content not found");
    }
}
