use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;
use turn_provider::TurnError;

#[derive(Debug)]
pub enum ApiError {
    MissingBearerToken,
    InvalidBaseUrl(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    StreamFailed { message: String },
    Contract(String),
    Cancelled,
    Unknown(String),
}

/// Provider error envelope: `{"error": {"message": …}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(rename = "error")]
    pub value: Option<ErrorPayloadFields>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayloadFields {
    pub message: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBearerToken => write!(f, "bearer token is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::StreamFailed { message } => write!(f, "stream failed: {message}"),
            Self::Contract(message) => write!(f, "contract violation: {message}"),
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

impl From<ApiError> for TurnError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Status(status, message) => Self::Status {
                status: status.as_u16(),
                message,
            },
            ApiError::StreamFailed { message } => Self::Provider(message),
            ApiError::Contract(message) => Self::Contract(message),
            ApiError::Cancelled => Self::Cancelled,
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Decode a provider error body, falling back to the HTTP reason phrase.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload
            .value
            .and_then(|fields| fields.message)
            .filter(|message| !message.trim().is_empty())
        {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("HTTP status {}", status.as_u16()))
    } else {
        body.to_string()
    }
}
