use std::sync::Arc;

use crate::shared_state::{PrivacyStatus, SharedStateName};

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while preparing, sending or reconciling a delivery call.
///
/// The `Display` output of every variant is the human-readable string reported back to the
/// requester in the prefetch response event.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The prefetch request list was missing or empty.
    #[error("Empty or null prefetch requests list")]
    EmptyPrefetchRequests,

    /// A prefetch request at `index` has an empty mbox name.
    #[error("Invalid prefetch request at index {index}: mbox name is empty")]
    InvalidMboxName { index: usize },

    /// A required upstream shared state has not been resolved yet.
    #[error("Missing shared state - {0}")]
    MissingSharedState(SharedStateName),

    /// Configuration is resolved but carries no client code.
    #[error("Missing client code")]
    MissingClientCode,

    /// Privacy status is anything other than opted in (including missing).
    #[error("Privacy status is not opted in ({})", .0.map(|s| s.as_str()).unwrap_or("missing"))]
    PrivacyNotOptedIn(Option<PrivacyStatus>),

    /// The delivery request could not be serialized.
    #[error("Failed to serialize delivery request")]
    RequestSerialization(#[source] Arc<serde_json::Error>),

    /// The delivery URL could not be built from the configured host.
    #[error("Invalid delivery server configuration")]
    InvalidServer(#[source] url::ParseError),

    /// Network error, including connect and read timeouts.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// The response body could not be parsed as a delivery response.
    #[error("Target response parser initialization failed")]
    ResponseParse(#[source] Arc<serde_json::Error>),

    /// The service answered with a non-success status code.
    #[error("Errors returned in Target response: {message}")]
    Remote { status: u16, message: String },

    /// An I/O error from a persistent store.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// A persistent store file holds malformed contents.
    #[error("malformed data store contents")]
    StoreFormat(#[source] Arc<serde_json::Error>),
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Detected before any network action.
    Precondition,
    /// Preconditions hold but the request could not be produced.
    Build,
    /// The call did not yield a parseable response.
    Transport,
    /// A parsed response reported an error.
    Remote,
    /// Persistent store failure.
    Persistence,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyPrefetchRequests
            | Error::InvalidMboxName { .. }
            | Error::MissingSharedState(_)
            | Error::MissingClientCode
            | Error::PrivacyNotOptedIn(_) => ErrorKind::Precondition,
            Error::RequestSerialization(_) | Error::InvalidServer(_) => ErrorKind::Build,
            Error::Network(_) | Error::ResponseParse(_) => ErrorKind::Transport,
            Error::Remote { .. } => ErrorKind::Remote,
            Error::Io(_) | Error::StoreFormat(_) => ErrorKind::Persistence,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}
