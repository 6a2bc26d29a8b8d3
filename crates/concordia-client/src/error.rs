//! Mapping of HTTP failures onto the concordia error taxonomy.

use concordia_core::Error;
use reqwest::StatusCode;

/// Error for a non-success response.
///
/// 404 and 410 mean the referenced object is gone; 5xx is a transient
/// service failure; any other status is a rejected request.
pub fn from_status(status: StatusCode, context: &str, body: &str) -> Error {
    let detail = if body.trim().is_empty() {
        format!("{} returned {}", context, status)
    } else {
        format!("{} returned {}: {}", context, status, body.trim())
    };
    match status.as_u16() {
        404 | 410 => Error::NotFound(detail),
        500..=599 => Error::Unavailable(detail),
        _ => Error::Request(detail),
    }
}

/// Error for a request that produced no usable response.
pub fn from_transport(err: &reqwest::Error, context: &str) -> Error {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        Error::Unavailable(format!("{} failed: {}", context, err))
    } else if err.is_decode() {
        Error::Serialization(format!("Failed to parse {} response: {}", context, err))
    } else {
        Error::Request(format!("{} failed: {}", context, err))
    }
}
