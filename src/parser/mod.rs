//! HTTP request parsing.
//!
//! Turns the bytes read from a connection into an [`HttpRequest`]: the
//! already-parsed request the dispatcher routes on.

mod request;
mod method;
mod version;
mod error;

// Re-export public items
pub use request::{HttpRequest, message_length, parse_request};
pub use method::Method;
pub use version::HttpVersion;
pub use error::Error;
