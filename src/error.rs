//! Error types for the synchronization layer

use crate::engine::EngineError;

/// Errors surfaced by the synchronization layer.
///
/// None of these are fatal. The worst outcome is a stale or unsaved layout;
/// the routing graph itself stays authoritative in the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// Engine unreachable, timed out, or rejected a call
    #[error("engine call failed: {0}")]
    Engine(#[from] EngineError),

    /// Payload from the engine could not be interpreted at all
    #[error("malformed engine response: {0}")]
    MalformedResponse(String),

    /// Durable save failed; the dirty flag has been restored
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// No engine present (preview / harness mode)
    #[error("engine not available")]
    NotAvailable,

    /// Handle is not present in the local mirror
    #[error("node {0} not found")]
    UnknownNode(u32),
}

impl SyncError {
    /// Transient failures are retried on the next natural trigger.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Engine(e) => e.is_transient(),
            SyncError::NotAvailable => true,
            _ => false,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
