//! Engine command surface
//!
//! The audio engine runs in a separate process and owns the routing graph.
//! Everything the editor knows about it comes through `EngineClient`.
//! Query results come back as raw JSON so the boundary adapter in
//! `api::decode` can normalize them field by field.

pub mod local;
pub mod unavailable;

use crate::api::dto::{OutputSinkDto, SourceIdDto, UIStateDto};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use local::LocalEngine;
pub use unavailable::NoEngine;

/// Errors raised by an engine call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("engine unreachable: {0}")]
    Unreachable(String),

    #[error("engine call timed out")]
    Timeout,

    #[error("engine rejected call: {0}")]
    Rejected(String),

    #[error("engine I/O error: {0}")]
    Io(String),

    #[error("engine serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Transient errors are retried on the next natural trigger
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Unreachable(_) | EngineError::Timeout | EngineError::Io(_)
        )
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Asynchronous request/response surface of the audio engine.
///
/// Calls suspend the caller but never block the thread. There is no
/// cancellation; once issued, a call runs to completion.
pub trait EngineClient: Send + Sync + 'static {
    /// Whether the host environment advertises a reachable engine.
    ///
    /// Returning `false` does not make the engine unusable; a single
    /// successful call also confirms availability.
    fn is_advertised(&self) -> bool {
        true
    }

    /// Full graph snapshot `{nodes: [...], edges: [...]}`
    fn get_graph(&self) -> impl Future<Output = EngineResult<Value>> + Send;

    fn add_source_node(
        &self,
        source_id: SourceIdDto,
        label: Option<String>,
    ) -> impl Future<Output = EngineResult<u32>> + Send;

    fn add_bus_node(
        &self,
        label: Option<String>,
        port_count: Option<u8>,
    ) -> impl Future<Output = EngineResult<u32>> + Send;

    fn add_sink_node(
        &self,
        sink: OutputSinkDto,
        label: Option<String>,
    ) -> impl Future<Output = EngineResult<u32>> + Send;

    fn remove_node(&self, handle: u32) -> impl Future<Output = EngineResult<()>> + Send;

    fn add_edge(
        &self,
        source: u32,
        source_port: u8,
        target: u32,
        target_port: u8,
        gain: f32,
        muted: bool,
    ) -> impl Future<Output = EngineResult<u32>> + Send;

    fn remove_edge(&self, id: u32) -> impl Future<Output = EngineResult<()>> + Send;

    fn set_edge_gain(&self, id: u32, gain: f32) -> impl Future<Output = EngineResult<()>> + Send;

    fn set_edge_muted(&self, id: u32, muted: bool)
        -> impl Future<Output = EngineResult<()>> + Send;

    /// Fast, non-durable UI state cache held by the engine process
    fn get_ui_state_cache(&self) -> impl Future<Output = EngineResult<Option<Value>>> + Send;

    fn set_ui_state_cache(&self, state: UIStateDto)
        -> impl Future<Output = EngineResult<()>> + Send;

    /// Durable, disk-backed save
    fn persist_state(&self, state: UIStateDto) -> impl Future<Output = EngineResult<()>> + Send;

    fn restore_state(&self) -> impl Future<Output = EngineResult<Option<Value>>> + Send;
}

/// Availability gate for engine-facing background work.
///
/// Open once the host advertises the engine or any call has succeeded.
/// Cheap to clone; all clones share the confirmation.
#[derive(Debug, Clone)]
pub struct Availability {
    advertised: bool,
    confirmed: Arc<AtomicBool>,
}

impl Availability {
    pub fn new(advertised: bool) -> Self {
        Self {
            advertised,
            confirmed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn for_engine<E: EngineClient>(engine: &E) -> Self {
        Self::new(engine.is_advertised())
    }

    pub fn is_available(&self) -> bool {
        self.advertised || self.confirmed.load(Ordering::Acquire)
    }

    pub fn confirm(&self) {
        if !self.confirmed.swap(true, Ordering::AcqRel) {
            log::debug!("[engine] availability confirmed by a successful call");
        }
    }

    /// Record the outcome of an engine call and pass it through.
    pub fn observe<T>(&self, result: EngineResult<T>) -> EngineResult<T> {
        if result.is_ok() {
            self.confirm();
        }
        result
    }
}
