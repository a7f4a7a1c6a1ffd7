//! Error types for the HTTP request parser.

use thiserror::Error;

/// Errors that can occur while reading an HTTP request off the wire.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP method in the request is not one we recognize.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The request target is missing or does not start with `/`.
    #[error("Invalid request target: {0}")]
    InvalidPath(String),

    /// The request line does not have the `METHOD TARGET VERSION` shape.
    #[error("Malformed request line: {0}")]
    MalformedRequestLine(String),

    /// The HTTP version in the request is not supported.
    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    /// A required header is missing from the request.
    #[error("Required header is missing: {0}")]
    MissingHeader(String),

    /// A header line has no `:` separator or an empty name.
    #[error("Invalid header line: {0}")]
    InvalidHeaderFormat(String),

    /// `Content-Length` is not a valid non-negative integer.
    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),

    /// The buffer ends before the header block or the declared body does.
    #[error("Incomplete request")]
    Incomplete,

    /// The request is empty.
    #[error("Empty request")]
    EmptyRequest,

    /// Error parsing the body as JSON.
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}
