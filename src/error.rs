use thiserror::Error;
use warp::http::StatusCode;

#[derive(Error, Debug)]
pub(crate) enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("request timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub(crate) fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to clients. Internal causes are never exposed.
    pub(crate) fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl warp::reject::Reject for AppError {}

impl From<sled::Error> for AppError {
    fn from(error: sled::Error) -> Self {
        AppError::Internal(error.into())
    }
}

pub(crate) type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_their_cause() {
        let error = AppError::from(anyhow::anyhow!("tree `alerts` is corrupted"));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.public_message(), "internal server error");
    }

    #[test]
    fn not_found_names_the_resource() {
        let error = AppError::NotFound("alert");
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
        assert_eq!(error.public_message(), "alert not found");
    }

    #[test]
    fn converts_into_a_rejection() {
        fn lookup() -> Result<(), warp::Rejection> {
            Err(AppError::forbidden("only the owner may do that"))?;
            Ok(())
        }
        let rejection = lookup().unwrap_err();
        let error = rejection.find::<AppError>().unwrap();
        assert_eq!(error.status(), StatusCode::FORBIDDEN);

        let rejection: warp::Rejection = AppError::Timeout.into();
        assert!(matches!(rejection.find::<AppError>(), Some(AppError::Timeout)));
    }
}
