//! Error types for the core crate.

use thiserror::Error;

/// Why an inbound push frame was dropped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a send was refused before reaching the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendRejected {
    #[error("message is empty")]
    Blank,

    #[error("still waiting for the previous reply")]
    Busy,
}
