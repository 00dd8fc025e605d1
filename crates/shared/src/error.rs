use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AccessDenied,
    MissingRecord,
    Validation,
    SessionExpired,
    Internal,
}

impl ErrorCode {
    /// Maps the exception class name found in a JSON-RPC error payload.
    pub fn from_exception_name(name: &str) -> Self {
        match name.rsplit('.').next().unwrap_or(name) {
            "AccessError" | "AccessDenied" => ErrorCode::AccessDenied,
            "MissingError" => ErrorCode::MissingRecord,
            "UserError" | "ValidationError" | "RedirectWarning" => ErrorCode::Validation,
            "SessionExpiredException" => ErrorCode::SessionExpired,
            _ => ErrorCode::Internal,
        }
    }
}

/// Failure reported by the server itself, as opposed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {message}")]
pub struct ApiException {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiException {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TodoCommandParseError {
    #[error("empty todo command")]
    Empty,
    #[error("unknown todo command verb '{0}'")]
    UnknownVerb(String),
    #[error("todo command '{verb}' expects {expected}")]
    MissingArgument {
        verb: &'static str,
        expected: &'static str,
    },
    #[error("todo command '{verb}' got unexpected arguments: {args}")]
    UnexpectedArguments { verb: &'static str, args: String },
    #[error("invalid id '{value}' in todo command '{verb}'")]
    InvalidId { verb: &'static str, value: String },
}
