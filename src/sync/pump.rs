//! UI state cache pump
//!
//! Pushes the layout into the engine's fast, non-durable cache so a UI
//! reload does not lose it. Edits are debounced; canvas commits skip the
//! debounce. At most one write is in flight: snapshots taken meanwhile
//! overwrite a single pending slot, and whatever sits there when the write
//! returns is sent next. A payload identical to the last one sent is
//! skipped.
//!
//! The pump never returns an error. Failures are logged and the snapshot
//! stays pending until the next trigger.

use crate::api::decode::{decode_ui_state, UiStateDescriptor};
use crate::api::dto::UIStateDto;
use crate::engine::{Availability, EngineClient};
use crate::error::SyncResult;
use crate::layout::position::UiStateSnapshot;
use crate::layout::SharedStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What a call to [`CachePump::flush`] ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// At least one write reached the engine
    Sent,
    /// Nothing new since the last write
    Unchanged,
    /// A write was already running; it picks this snapshot up when done
    Coalesced,
    /// No engine; nothing attempted
    Unavailable,
    /// The write failed; the snapshot stays pending
    Failed,
}

#[derive(Default)]
struct PumpState {
    timer: Option<JoinHandle<()>>,
    in_flight: bool,
    pending: Option<UiStateSnapshot>,
    /// Serialized form of the last payload the engine accepted
    last_sent: Option<String>,
    writes: u64,
}

/// Clears the in-flight marker if the flush future is dropped mid-write.
/// Normal exits land it under the same lock that finds nothing pending, so
/// a snapshot parked meanwhile is never left behind.
struct InFlight<'a> {
    state: &'a Mutex<PumpState>,
    armed: bool,
}

impl InFlight<'_> {
    fn land(&mut self, state: &mut PumpState) {
        state.in_flight = false;
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().in_flight = false;
        }
    }
}

pub struct CachePump<E> {
    engine: Arc<E>,
    availability: Availability,
    store: SharedStore,
    debounce: Duration,
    state: Mutex<PumpState>,
}

impl<E: EngineClient> CachePump<E> {
    pub fn new(engine: Arc<E>, availability: Availability, store: SharedStore, debounce: Duration) -> Self {
        Self {
            engine,
            availability,
            store,
            debounce,
            state: Mutex::new(PumpState::default()),
        }
    }

    /// Flush once edits have been quiet for the debounce window. A running
    /// window is restarted.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn schedule(self: &Arc<Self>) {
        if !self.availability.is_available() {
            return;
        }
        let pump = Arc::clone(self);
        let delay = self.debounce;

        let mut state = self.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detached: aborting the timer must not abort a write
            tokio::spawn(async move {
                pump.flush().await;
            });
        }));
    }

    /// Flush right away, dropping any running debounce window.
    pub fn flush_soon(self: &Arc<Self>) {
        if !self.availability.is_available() {
            return;
        }
        self.cancel();
        let pump = Arc::clone(self);
        tokio::spawn(async move {
            pump.flush().await;
        });
    }

    /// Drop the debounce window, if any. A write already running finishes.
    pub fn cancel(&self) {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.abort();
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.state
            .lock()
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Writes the engine has accepted so far
    pub fn writes(&self) -> u64 {
        self.state.lock().writes
    }

    /// Send the current layout to the engine cache.
    pub async fn flush(&self) -> FlushOutcome {
        if !self.availability.is_available() {
            return FlushOutcome::Unavailable;
        }

        let snapshot = self.store.lock().snapshot();
        {
            let mut state = self.state.lock();
            state.pending = Some(snapshot);
            if state.in_flight {
                log::debug!("[pump] write in flight, snapshot parked");
                return FlushOutcome::Coalesced;
            }
            state.in_flight = true;
        }
        let mut flight = InFlight {
            state: &self.state,
            armed: true,
        };

        let mut outcome = FlushOutcome::Unchanged;
        loop {
            let (snapshot, payload) = {
                let mut state = self.state.lock();
                let Some(snapshot) = state.pending.take() else {
                    flight.land(&mut state);
                    return outcome;
                };
                let payload = match serde_json::to_string(&UIStateDto::from(&snapshot)) {
                    Ok(payload) => payload,
                    Err(e) => {
                        log::warn!("[pump] could not serialize ui state: {}", e);
                        flight.land(&mut state);
                        return FlushOutcome::Failed;
                    }
                };
                if state.last_sent.as_deref() == Some(payload.as_str()) {
                    continue;
                }
                (snapshot, payload)
            };

            let dto = UIStateDto::from(&snapshot);
            match self.availability.observe(self.engine.set_ui_state_cache(dto).await) {
                Ok(()) => {
                    let mut state = self.state.lock();
                    state.writes += 1;
                    log::debug!(
                        "[pump] cache write #{}: {} positions",
                        state.writes,
                        snapshot.positions.len()
                    );
                    state.last_sent = Some(payload);
                    outcome = FlushOutcome::Sent;
                }
                Err(e) => {
                    log::warn!("[pump] cache write failed, will retry on next edit: {}", e);
                    let mut state = self.state.lock();
                    if state.pending.is_none() {
                        state.pending = Some(snapshot);
                    }
                    flight.land(&mut state);
                    return FlushOutcome::Failed;
                }
            }
        }
    }

    /// Read back whatever the engine cache holds
    pub async fn fetch(&self) -> SyncResult<Option<UiStateDescriptor>> {
        let cached = self
            .availability
            .observe(self.engine.get_ui_state_cache().await)?;
        match cached {
            Some(value) => decode_ui_state(&value),
            None => Ok(None),
        }
    }
}
