//! Error types for the enrichment store
//!
//! Provides unified error handling using thiserror. None of these errors ever
//! escape the public data layer or validator surfaces; they are logged and the
//! caller degrades to cached or unaugmented data.

use thiserror::Error;

// == Transport Error ==
/// The HTTP client could not produce a response at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Transport error: {0}")]
pub struct TransportError(pub String);

// == Retriever Error ==
/// Outcome classification for a single resource fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrieverError {
    /// No HTTP response was received
    #[error("No response: {0}")]
    NoResponse(String),

    /// 2xx response without a body
    #[error("Empty body")]
    EmptyBody,

    /// 2xx response whose body could not be turned into the resource
    #[error("Could not decode JSON: {0}")]
    CouldNotDecodeJson(String),

    /// 304, the previously cached resource is still current
    #[error("Not modified")]
    NotModified,

    /// Any other status code
    #[error("Non 200 response: {0}")]
    Non200Response(u16),
}

impl RetrieverError {
    // == Is Retryable ==
    /// Returns true when a further attempt could plausibly succeed.
    ///
    /// Transport failures and empty bodies are retried, as are 408, 429 and
    /// every 5xx. Decode failures and 304 are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            RetrieverError::NoResponse(_) | RetrieverError::EmptyBody => true,
            RetrieverError::Non200Response(code) => {
                *code == 408 || *code == 429 || (500..600).contains(code)
            }
            RetrieverError::CouldNotDecodeJson(_) | RetrieverError::NotModified => false,
        }
    }

    /// Returns true for the 304 control signal.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, RetrieverError::NotModified)
    }
}

impl From<TransportError> for RetrieverError {
    fn from(err: TransportError) -> Self {
        RetrieverError::NoResponse(err.0)
    }
}

// == Hosted Data Error ==
/// Failures while fetching a hosted data layer fragment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostedDataError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Non 200 response: {0}")]
    Non200Response(u16),

    #[error("Empty response")]
    EmptyResponse,

    #[error("Unable to decode data: {0}")]
    UnableToDecodeData(String),

    /// The item id has been suppressed locally after earlier failures
    #[error("Data layer item {0}.json does not exist")]
    Blacklisted(String),
}

impl HostedDataError {
    /// Empty and undecodable payloads cannot be fixed by retrying, nor can a
    /// client error other than 408 or 429.
    pub fn is_terminal(&self) -> bool {
        match self {
            HostedDataError::EmptyResponse
            | HostedDataError::UnableToDecodeData(_)
            | HostedDataError::Blacklisted(_) => true,
            HostedDataError::Non200Response(code) => {
                (400..500).contains(code) && *code != 408 && *code != 429
            }
            HostedDataError::Transport(_) => false,
        }
    }
}

impl From<TransportError> for HostedDataError {
    fn from(err: TransportError) -> Self {
        HostedDataError::Transport(err.0)
    }
}

// == Session Error ==
/// Failures of the out-of-band session registration call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Error when requesting a new session: {0}")]
    ErrorInRequest(String),

    #[error("Invalid response when requesting a new session: {0}")]
    InvalidResponse(u16),
}

// == Storage Error ==
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Result Type Alias ==
/// Convenience Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_status_codes() {
        assert!(RetrieverError::Non200Response(408).is_retryable());
        assert!(RetrieverError::Non200Response(429).is_retryable());
        assert!(RetrieverError::Non200Response(500).is_retryable());
        assert!(RetrieverError::Non200Response(599).is_retryable());
        assert!(!RetrieverError::Non200Response(404).is_retryable());
        assert!(!RetrieverError::Non200Response(600).is_retryable());
    }

    #[test]
    fn test_terminal_retriever_errors() {
        assert!(RetrieverError::EmptyBody.is_retryable());
        assert!(RetrieverError::NoResponse("reset".to_string()).is_retryable());
        assert!(!RetrieverError::NotModified.is_retryable());
        assert!(!RetrieverError::CouldNotDecodeJson("eof".to_string()).is_retryable());
    }

    #[test]
    fn test_hosted_terminal_errors() {
        assert!(HostedDataError::EmptyResponse.is_terminal());
        assert!(HostedDataError::UnableToDecodeData("x".to_string()).is_terminal());
        assert!(!HostedDataError::Non200Response(503).is_terminal());
        assert!(!HostedDataError::Non200Response(429).is_terminal());
        assert!(HostedDataError::Non200Response(404).is_terminal());
        assert!(!HostedDataError::Transport("timeout".to_string()).is_terminal());
    }

    #[test]
    fn test_transport_conversion() {
        let err: RetrieverError = TransportError("refused".to_string()).into();
        assert_eq!(err, RetrieverError::NoResponse("refused".to_string()));
    }
}
