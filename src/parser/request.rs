//! HTTP request parsing and representation.

use std::collections::HashMap;
use std::str::FromStr;
use serde::de::DeserializeOwned;

use crate::headers::Headers;
use crate::parser::error::Error;
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// An inbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request target exactly as sent, query string included
    pub target: String,
    /// The routing path: the target without its query string
    pub path: String,
    /// The HTTP version
    pub version: HttpVersion,
    /// The HTTP headers
    pub headers: Headers,
    /// The request body
    pub body: Vec<u8>,
    /// Query parameters parsed from the target
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    /// Create a new HTTP request with an empty body.
    ///
    /// `target` may carry a query string; the routing path and the query
    /// parameters are derived from it.
    pub fn new(method: Method, target: impl Into<String>, version: HttpVersion, headers: Headers) -> Self {
        let target = target.into();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query)),
            None => (target.clone(), None),
        };

        let query_params = query
            .map(|query| query
                .split('&')
                .filter(|s| !s.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (pair.to_string(), String::new()),
                })
                .collect())
            .unwrap_or_default();

        Self {
            method,
            target,
            path,
            version,
            headers,
            body: Vec::new(),
            query_params,
        }
    }

    /// Replace the request body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header, keeping any existing values for the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Get a header value. Lookup is case-insensitive.
    pub fn get_header(&self, name: &str) -> Option<String> {
        self.headers.get(name)
    }

    /// Check if a header exists.
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.has(name)
    }

    /// Parse the request body as JSON.
    ///
    /// Fails when the request is not labelled `application/json` or the body
    /// does not deserialize into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if !self.is_json() {
            return Err(Error::MissingHeader("Content-Type: application/json".to_string()));
        }

        let json = serde_json::from_slice(&self.body)?;
        Ok(json)
    }

    /// Check if the request has a JSON body.
    pub fn is_json(&self) -> bool {
        self.get_header("Content-Type")
            .is_some_and(|content_type| content_type.starts_with("application/json"))
    }

    /// Get a query parameter value.
    pub fn get_query_param(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    pub fn has_query_param(&self, name: &str) -> bool {
        self.query_params.contains_key(name)
    }
}

fn find_header_end(input: &[u8]) -> Option<usize> {
    input
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

fn declared_content_length(head: &str) -> Result<usize, Error> {
    for line in head.split("\r\n").skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("Content-Length") {
                let value = value.trim();
                return value
                    .parse()
                    .map_err(|_| Error::InvalidContentLength(value.to_string()));
            }
        }
    }
    Ok(0)
}

/// Report how many bytes the request at the start of `input` occupies.
///
/// Returns `Ok(None)` while the header block or the declared body is still
/// incomplete, so a connection can keep reading.
pub fn message_length(input: &[u8]) -> Result<Option<usize>, Error> {
    let Some(head_end) = find_header_end(input) else {
        return Ok(None);
    };

    let head = std::str::from_utf8(&input[..head_end])
        .map_err(|_| Error::MalformedRequestLine("Invalid UTF-8".to_string()))?;
    let declared = declared_content_length(head)?;
    let total = (head_end + HEADER_TERMINATOR.len())
        .checked_add(declared)
        .ok_or_else(|| Error::InvalidContentLength(declared.to_string()))?;

    Ok((input.len() >= total).then_some(total))
}

/// Parse an HTTP request from a byte slice.
///
/// The header block ends at the first blank line; a missing blank line is
/// tolerated and treated as a request without a body. The body is delimited
/// by `Content-Length`.
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, Error> {
    if input.is_empty() {
        return Err(Error::EmptyRequest);
    }

    let (head, rest) = match find_header_end(input) {
        Some(end) => (&input[..end], &input[end + HEADER_TERMINATOR.len()..]),
        None => (input, &input[input.len()..]),
    };

    let head = std::str::from_utf8(head)
        .map_err(|_| Error::MalformedRequestLine("Invalid UTF-8".to_string()))?;
    let mut lines = head.lines();

    // Request line
    let request_line = lines.next().ok_or(Error::EmptyRequest)?;
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    let &[method, target, version] = parts.as_slice() else {
        return Err(Error::MalformedRequestLine(request_line.to_string()));
    };

    let method = Method::from_str(method)?;
    if !target.starts_with('/') {
        return Err(Error::InvalidPath(target.to_string()));
    }
    let version = HttpVersion::from_str(version)?;

    // Header lines
    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHeaderFormat(line.to_string()))?;
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(Error::InvalidHeaderFormat(line.to_string()));
        }

        headers.append(name, value.trim());
    }

    if version == HttpVersion::Http11 && !headers.has("Host") {
        return Err(Error::MissingHeader("Host".to_string()));
    }

    // Body
    let content_length = match headers.get("Content-Length") {
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map_err(|_| Error::InvalidContentLength(value.clone()))?,
        None => 0,
    };
    if rest.len() < content_length {
        return Err(Error::Incomplete);
    }

    Ok(HttpRequest::new(method, target, version, headers).with_body(&rest[..content_length]))
}
