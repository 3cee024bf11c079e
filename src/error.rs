//! Error types for webpage-embed

use thiserror::Error;

/// Errors that can occur when fetching metadata or resolving an embed.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to parse or validate the URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// URL parse error (from url crate)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// HTTP request failed or timed out
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    /// A byte sequence could not be decoded in the declared charset
    #[error("undecodable {encoding} byte sequence at offset {position}")]
    Decode {
        encoding: &'static str,
        position: usize,
    },

    /// Failed to read a local source
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON oEmbed document
    #[error("malformed JSON document: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed XML oEmbed document
    #[error("malformed XML document: {0}")]
    Xml(String),

    /// An oEmbed document lacks a field its type requires
    #[error("{kind} oEmbed document is missing `{field}`")]
    MissingField { kind: String, field: &'static str },

    /// Request blocked due to SSRF protection
    #[cfg(feature = "http")]
    #[error("SSRF protection: {0}")]
    SsrfBlocked(String),

    /// The background head scan did not complete
    #[error("head scan task failed: {0}")]
    Task(String),
}

impl Error {
    /// Whether this is a 4xx response.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Status { status, .. } if (400..500).contains(status))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

/// Result type alias for webpage-embed operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        let not_found = Error::Status {
            url: "http://example.com/".to_string(),
            status: 404,
        };
        let unavailable = Error::Status {
            url: "http://example.com/".to_string(),
            status: 503,
        };
        assert!(not_found.is_client_error());
        assert!(!unavailable.is_client_error());
        assert!(!Error::Xml("eof".to_string()).is_client_error());
    }
}
