// src/error.rs

use thiserror::Error;

/// Failure kinds surfaced by the workflow and its collaborators.
///
/// Nothing here is fatal to the process: validation errors never reach the
/// network, and every other kind is contained to the workflow instance that
/// produced it.
#[derive(Debug, Error)]
pub enum FesatError {
    /// A precondition failed; no network call was attempted.
    #[error("{0}")]
    Validation(String),

    /// The request never produced a usable reply (connect failure, non-2xx).
    #[error("request failed: {0}")]
    Transport(String),

    /// The collaborator answered but reported a semantic failure. The
    /// message is displayed to the user verbatim.
    #[error("{0}")]
    Upstream(String),

    /// The collaborator answered 2xx with a body we cannot interpret.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for FesatError {
    fn from(err: reqwest::Error) -> Self {
        FesatError::Transport(err.to_string())
    }
}
