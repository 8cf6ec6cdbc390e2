//! Write side of the layout: cache pump, durable save, refresh polling,
//! and the session that owns them.

pub mod persistence;
pub mod pump;
pub mod scheduler;
pub mod session;

pub use persistence::{PersistenceCoordinator, SaveOutcome};
pub use pump::{CachePump, FlushOutcome};
pub use scheduler::RefreshScheduler;
pub use session::{StartupReport, SyncSession};
