//! Layout state: positions keyed by stable id, the canvas transform, and
//! default placement for nodes seen for the first time.

pub mod position;
pub mod store;
pub mod tiling;

use parking_lot::Mutex;
use std::sync::Arc;

pub use position::{CanvasTransform, Position, UiStateSnapshot};
pub use store::PositionStore;
pub use tiling::{Tiler, TilingPolicy};

/// The one `PositionStore` of a session, shared by the mirror, the cache
/// pump and the persistence coordinator.
///
/// Lock order: `GraphMirror` internals first, then the store.
pub type SharedStore = Arc<Mutex<PositionStore>>;
