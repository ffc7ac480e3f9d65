use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")] Database(#[from] sea_orm::DbErr),

    #[error("Storage error: {0}")] Storage(String),

    #[error("Serialization error: {0}")] Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")] Validation(String),

    #[error("Invalid address")]
    InvalidAddress,

    #[error("Entity not found: {0}")] EntityNotFound(String),

    #[error("Rule not found: {0}")] RuleNotFound(i64),

    #[error("External API error: {0}")] External(String),

    #[error("Notification error: {0}")] Notification(String),

    #[error("Configuration error: {0}")] Config(String),
}

/// Outcome of fetching one entity during a poll cycle.
///
/// Kept `Clone` so a single batch failure can be reported against every entity of the batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    #[error("credential rejected with status {0}")] Credential(u16),

    #[error("all {0} credentials exhausted")] CredentialsExhausted(usize),

    #[error("transport error: {0}")] Transport(String),

    #[error("upstream returned status {0}")] Upstream(u16),

    #[error("malformed response: {0}")] Parse(String),

    #[error("no data returned")]
    Missing,

    #[error("unsupported entity: {0}")] Unsupported(String),
}

impl PollError {
    /// 401/403/429-class failures that rotation can recover from.
    pub fn is_credential(&self) -> bool {
        matches!(self, PollError::Credential(_))
    }

    pub fn is_exhaustion(&self) -> bool {
        matches!(self, PollError::CredentialsExhausted(_))
    }
}

impl From<reqwest::Error> for PollError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PollError::Parse(err.to_string())
        } else {
            PollError::Transport(err.to_string())
        }
    }
}

#[derive(serde::Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(serde::Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    pub fn to_error_response(&self) -> ErrorResponse {
        let (code, message, field) = match self {
            AppError::Database(e) => ("DATABASE_ERROR", e.to_string(), None),
            AppError::Storage(msg) => ("STORAGE_ERROR", msg.clone(), None),
            AppError::Serialization(e) => ("SERIALIZATION_ERROR", e.to_string(), None),
            AppError::Validation(msg) => ("VALIDATION_ERROR", msg.clone(), None),
            AppError::InvalidAddress =>
                (
                    "INVALID_ADDRESS",
                    "Invalid address format".to_string(),
                    Some("address".to_string()),
                ),
            AppError::EntityNotFound(id) =>
                ("ENTITY_NOT_FOUND", format!("Entity not found: {}", id), None),
            AppError::RuleNotFound(id) =>
                ("RULE_NOT_FOUND", format!("Rule not found: {}", id), None),
            AppError::External(msg) => ("EXTERNAL_ERROR", msg.clone(), None),
            AppError::Notification(msg) => ("NOTIFICATION_ERROR", msg.clone(), None),
            AppError::Config(msg) => ("CONFIG_ERROR", msg.clone(), None),
        };

        ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                field,
            },
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::EntityNotFound(_) | AppError::RuleNotFound(_) => {
                axum::http::StatusCode::NOT_FOUND
            }
            AppError::Validation(_) | AppError::InvalidAddress => {
                axum::http::StatusCode::BAD_REQUEST
            }
            AppError::External(_) => {
                axum::http::StatusCode::BAD_GATEWAY
            }
            _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };

        let response = self.to_error_response();
        (status, axum::Json(response)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

pub type PollResult<T> = std::result::Result<T, PollError>;
