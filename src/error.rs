use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::models::question::Category;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("No active exam session found")]
    SessionNotFound,

    #[error("Not enough questions in category {category}: need {needed}, got {available}")]
    InsufficientQuestions {
        category: Category,
        needed: usize,
        available: usize,
    },

    #[error("Exam has already been completed, cannot submit more answers")]
    ExamAlreadyCompleted,

    #[error("Exam has expired, cannot submit answers")]
    ExamExpired,

    #[error("Exam has not been started yet")]
    ExamNotStarted,

    #[error("Question option not found")]
    OptionNotFound,

    #[error("Question not found or doesn't belong to this exam session")]
    QuestionNotInSession,

    #[error("No exam results found")]
    ResultsNotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::SessionNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            Error::InsufficientQuestions { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            Error::ExamAlreadyCompleted => (StatusCode::CONFLICT, self.to_string()),
            Error::ExamExpired => (StatusCode::FORBIDDEN, self.to_string()),
            Error::ExamNotStarted => (StatusCode::CONFLICT, self.to_string()),
            Error::OptionNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            Error::QuestionNotInSession => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::ResultsNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            Error::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Database(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Io(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Error::Anyhow(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred".to_string(),
            ),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
