use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::Request;
use thiserror::Error;
use tracing::error;

use crate::models::Message;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database unavailable")]
    Unavailable,

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn status(&self) -> Status {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) => Status::BadRequest,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Unauthorized(_) => Status::Unauthorized,
            ApiError::Forbidden(_) => Status::Forbidden,
            ApiError::Unavailable => Status::ServiceUnavailable,
            ApiError::Database(_) | ApiError::Hashing(_) | ApiError::Token(_) => {
                Status::InternalServerError
            }
        }
    }

    /// Message returned to the client. Internal failures are reported generically.
    pub fn public_message(&self) -> String {
        if self.status() == Status::InternalServerError {
            "Internal server error.".to_string()
        } else {
            self.to_string()
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status == Status::InternalServerError {
            error!("{} {} failed: {}", request.method(), request.uri(), self);
        }

        (status, Json(Message::new(self.public_message()))).respond_to(request)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_vote_is_a_bad_request() {
        let err = ApiError::Conflict("An employee can vote only once a day.".into());
        assert_eq!(err.status(), Status::BadRequest);
        assert_eq!(err.public_message(), "An employee can vote only once a day.");
    }

    #[test]
    fn database_details_are_not_exposed() {
        let err = ApiError::from(diesel::result::Error::NotFound);
        assert_eq!(err.status(), Status::InternalServerError);
        assert_eq!(err.public_message(), "Internal server error.");
    }
}
