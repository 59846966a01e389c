//! Errors returned by the Zabbix API client.

use thiserror::Error;

/// Errors that can occur while talking to the Zabbix API.
#[derive(Debug, Error)]
pub enum ZabbixError {
    /// The HTTP request could not be sent or returned a non-success status.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a JSON-RPC error object.
    #[error("{message} ({code}): {data}")]
    Api {
        /// JSON-RPC error code.
        code: i64,
        /// Short error message.
        message: String,
        /// Detailed explanation supplied by the server.
        data: String,
    },

    /// The request parameters could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// The response could not be decoded into the expected type.
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// The response was valid JSON-RPC but did not have the expected shape.
    #[error("unexpected response: {0}")]
    MalformedResponse(String),

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ZabbixError {
    /// Whether the error came from the remote API rather than the transport.
    pub fn is_api_error(&self) -> bool {
        matches!(self, Self::Api { .. })
    }

    /// Whether the request timed out before a response arrived.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_is_verbatim() {
        let err = ZabbixError::Api {
            code: -32602,
            message: "Invalid params.".to_string(),
            data: "Application \"cpu\" already exists.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid params. (-32602): Application \"cpu\" already exists."
        );
        assert!(err.is_api_error());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_malformed_response_display() {
        let err = ZabbixError::MalformedResponse("missing hostids".to_string());
        assert_eq!(err.to_string(), "unexpected response: missing hostids");
        assert!(!err.is_api_error());
    }
}
