//! Error types for request dispatch and serving.

use thiserror::Error;

use crate::parser::Error as ParserError;
use crate::server::response::{HttpResponse, StatusCode};

/// Body used when a failure carries no message of its own.
const GENERIC_FAILURE: &str = "Internal Server Error";

/// Errors that can occur while dispatching a request or serving connections.
///
/// Every variant can be turned into a complete response with
/// [`Error::to_response`]; the dispatcher does exactly that for anything a
/// handler chain returns.
#[derive(Debug, Error)]
pub enum Error {
    /// No route is registered for the requested path.
    #[error("Not found")]
    NotFound,

    /// The path is registered, but not for the requested method.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// A failure that carries its own status code and message.
    #[error("{message}")]
    Status { code: StatusCode, message: String },

    /// A protocol upgrade was requested without the required request headers,
    /// or more than once.
    #[error("{0}")]
    UpgradeRejected(String),

    /// Any other error surfaced by application handler code.
    #[error("{0}")]
    Handler(Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Internal server error.
    #[error("{0}")]
    InternalError(String),

    /// A handler panicked or its task was cancelled.
    #[error("Internal Server Error")]
    Unknown,

    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// A failure with an explicit status code and message.
    pub fn status(code: impl Into<StatusCode>, message: impl Into<String>) -> Self {
        Error::Status {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wrap an arbitrary handler error.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Error::Handler(err.into())
    }

    /// Reclassify a failure returned by a handler chain.
    ///
    /// A parse error only means 400 when it comes from reading the request
    /// off the wire. Raised inside a chain (e.g. from `HttpRequest::json`)
    /// it is an ordinary handler failure and answers 500 with its message.
    pub(crate) fn into_chain_failure(self) -> Self {
        match self {
            Error::ParseError(e) => Error::Handler(Box::new(e)),
            other => other,
        }
    }

    /// The status code this failure is answered with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::Status { code, .. } => *code,
            Error::ParseError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert the failure into the response sent to the client.
    ///
    /// The body is the failure's own message, or a generic one when the
    /// message is empty.
    pub fn to_response(&self) -> HttpResponse {
        let message = self.to_string();
        let body = if message.is_empty() { GENERIC_FAILURE.to_string() } else { message };

        HttpResponse::new(self.status_code())
            .with_content_type("text/plain;charset=UTF-8")
            .with_body_string(body)
    }
}
