//! Spectrum - graph state synchronization
//!
//! Keeps an editor's view of the Spectrum routing graph in step with the
//! audio engine: a mirror of the engine graph, operator layout keyed by
//! stable node identity, a coalescing cache pump, durable save/restore,
//! and the console fader/meter laws.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod layout;
pub mod sync;
pub mod units;

pub use config::SyncConfig;
pub use engine::{Availability, EngineClient, EngineError, EngineResult, LocalEngine, NoEngine};
pub use error::{SyncError, SyncResult};
pub use graph::{Edge, EdgeId, GraphMirror, Node, NodeHandle, NodeKind};
pub use layout::{CanvasTransform, Position, PositionStore, SharedStore, UiStateSnapshot};
pub use sync::{CachePump, PersistenceCoordinator, RefreshScheduler, SaveOutcome, SyncSession};

/// Install the logger.
///
/// Filter comes from `SPECTRUM_LOG`, then `RUST_LOG`, default `info`.
/// Calling it again is harmless.
pub fn init_logging() {
    let env = env_logger::Env::default()
        .filter_or("SPECTRUM_LOG", std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
