//! Error types for the link simulator.
//!
//! Only construction-time problems and simulation driver misuse are errors.
//! Runtime anomalies on the link (lost signal, corrupted frame, wrong
//! address, duplicate) are modeled as empty results by the layer that
//! observes them.

use thiserror::Error;

use crate::types::Address;

/// Link simulator error type
#[derive(Error, Debug)]
pub enum LinkError {
    /// Configuration rejected at construction
    #[error("configuration error: {0}")]
    Config(String),

    /// Simulation refers to a node that was never added
    #[error("unknown node: {0}")]
    UnknownNode(Address),

    /// Simulation refers to a link that was never connected
    #[error("no link from {0} to {1}")]
    NoLink(Address, Address),

    /// Single-frame send of a payload that needs fragmenting
    #[error("payload of {0} bytes needs a message send")]
    PayloadTooLong(usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for link simulator operations
pub type Result<T> = std::result::Result<T, LinkError>;
