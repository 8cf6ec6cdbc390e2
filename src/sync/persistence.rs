//! Durable save and startup restore
//!
//! Saves are single-flight: asking for a save while one is running joins
//! it and returns its result. A non-forced save only runs when the store is
//! dirty. The flag is cleared as the write starts and raised again if the
//! write fails, so the next trigger retries.

use crate::api::decode::{decode_ui_state, UiStateDescriptor};
use crate::api::dto::UIStateDto;
use crate::engine::{Availability, EngineClient};
use crate::error::{SyncError, SyncResult};
use crate::layout::position::UiStateSnapshot;
use crate::layout::store::PositionStore;
use crate::layout::SharedStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The engine wrote the snapshot to disk
    Written,
    /// Nothing changed since the last save
    Clean,
    /// No engine; nothing attempted
    Unavailable,
}

type SaveSlot = watch::Receiver<Option<SyncResult<SaveOutcome>>>;

pub struct PersistenceCoordinator<E> {
    engine: Arc<E>,
    availability: Availability,
    store: SharedStore,
    started: Instant,
    save_seq: AtomicU64,
    restore_seq: AtomicU64,
    in_flight: Mutex<Option<SaveSlot>>,
}

impl<E: EngineClient> PersistenceCoordinator<E> {
    pub fn new(engine: Arc<E>, availability: Availability, store: SharedStore) -> Self {
        Self {
            engine,
            availability,
            store,
            started: Instant::now(),
            save_seq: AtomicU64::new(0),
            restore_seq: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    fn uptime_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Save the layout durably. `force` skips the dirty check (explicit
    /// operator save, process exit).
    ///
    /// A forced save that joins a running write does not trust its snapshot:
    /// if the layout changed while that write ran, it writes again.
    pub async fn save(self: &Arc<Self>, force: bool) -> SyncResult<SaveOutcome> {
        loop {
            let (mut slot, joined) = {
                let mut in_flight = self.in_flight.lock();
                match in_flight.as_ref() {
                    Some(running) => {
                        log::debug!("[state] save requested while one is running, joining it");
                        (running.clone(), true)
                    }
                    None => match self.start_write(force) {
                        Ok(slot) => {
                            // Set while still locked; the writer clears it under the same lock
                            *in_flight = Some(slot.clone());
                            (slot, false)
                        }
                        Err(outcome) => return Ok(outcome),
                    },
                }
            };

            let result = match slot.wait_for(Option::is_some).await {
                Ok(done) => Option::clone(&done),
                Err(_) => None,
            };
            let result = result.unwrap_or_else(|| {
                Err(SyncError::Persistence("save task ended without a result".to_string()))
            });

            if force && joined && result.is_ok() && self.store.lock().is_dirty() {
                log::debug!("[state] joined save predates the latest edits, saving again");
                continue;
            }
            return result;
        }
    }

    /// Begin a write, or say why none is needed
    fn start_write(self: &Arc<Self>, force: bool) -> Result<SaveSlot, SaveOutcome> {
        let call_id = self.save_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let uptime = self.uptime_ms();

        if !self.availability.is_available() {
            log::debug!("[state] save#{} @{}ms: no engine, skipped", call_id, uptime);
            return Err(SaveOutcome::Unavailable);
        }

        let dto = {
            let mut store = self.store.lock();
            if !force && !store.is_dirty() {
                log::debug!("[state] save#{} @{}ms: clean, skipped", call_id, uptime);
                return Err(SaveOutcome::Clean);
            }
            store.mark_clean();
            UIStateDto::from(&store.snapshot())
        };

        log::info!(
            "[state] save#{} @{}ms: saving {} positions (forced={})",
            call_id,
            uptime,
            dto.node_positions.len(),
            force
        );

        let (done, slot) = watch::channel(None);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = match this.availability.observe(this.engine.persist_state(dto).await) {
                Ok(()) => {
                    log::info!("[state] save#{} @{}ms: done", call_id, this.uptime_ms());
                    Ok(SaveOutcome::Written)
                }
                Err(e) => {
                    this.store.lock().mark_dirty();
                    log::warn!(
                        "[state] save#{} @{}ms: failed, layout stays dirty: {}",
                        call_id,
                        this.uptime_ms(),
                        e
                    );
                    Err(SyncError::Persistence(e.to_string()))
                }
            };
            *this.in_flight.lock() = None;
            done.send_replace(Some(result));
        });
        Ok(slot)
    }

    /// Read the durable snapshot. `Ok(None)` when nothing was ever saved.
    ///
    /// This is the startup probe, so it runs even when availability has not
    /// been confirmed yet.
    pub async fn restore(&self) -> SyncResult<Option<UiStateDescriptor>> {
        let call_id = self.restore_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let saved = self.availability.observe(self.engine.restore_state().await)?;
        let Some(value) = saved else {
            log::info!("[state] restore#{} @{}ms: nothing saved", call_id, self.uptime_ms());
            return Ok(None);
        };

        let decoded = decode_ui_state(&value)?;
        if let Some(state) = &decoded {
            log::info!(
                "[state] restore#{} @{}ms: {} positions, {} handle-keyed, canvas={}",
                call_id,
                self.uptime_ms(),
                state.positions.len(),
                state.legacy_by_handle.len(),
                state.canvas.is_some()
            );
        }
        Ok(decoded)
    }
}

/// Merge a decoded UI state into the store. Positions and canvas replace
/// what the store holds; a payload without a canvas keeps the current one.
/// Handle-keyed entries are left to the caller.
///
/// Returns the number of positions taken over.
pub fn merge_restored(store: &mut PositionStore, restored: &UiStateDescriptor) -> usize {
    let canvas = restored.canvas.unwrap_or_else(|| store.canvas());
    store.load_from(UiStateSnapshot {
        positions: restored.positions.clone(),
        canvas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LocalEngine, NoEngine};
    use crate::layout::position::{CanvasTransform, Position};

    fn coordinator<E: EngineClient>(engine: Arc<E>) -> (SharedStore, Arc<PersistenceCoordinator<E>>) {
        let store: SharedStore = Arc::new(Mutex::new(PositionStore::new()));
        let availability = Availability::for_engine(engine.as_ref());
        let coordinator = PersistenceCoordinator::new(engine, availability, store.clone());
        (store, Arc::new(coordinator))
    }

    #[tokio::test]
    async fn test_dirty_gate() {
        let dir = tempfile::tempdir().unwrap();
        let (store, persistence) = coordinator(Arc::new(LocalEngine::with_state_dir(dir.path())));

        assert_eq!(persistence.save(false).await, Ok(SaveOutcome::Clean));

        store.lock().set("bus:a", Position::new(1.0, 2.0));
        assert_eq!(persistence.save(false).await, Ok(SaveOutcome::Written));
        assert!(!store.lock().is_dirty());
        assert_eq!(persistence.save(false).await, Ok(SaveOutcome::Clean));

        // Operator save always writes
        assert_eq!(persistence.save(true).await, Ok(SaveOutcome::Written));
        assert!(dir.path().join("graph_state.json").exists());
    }

    #[tokio::test]
    async fn test_failed_save_restores_dirty() {
        // No state dir: the engine cannot write
        let (store, persistence) = coordinator(Arc::new(LocalEngine::new(None)));
        store.lock().set("bus:a", Position::new(1.0, 2.0));

        let result = persistence.save(false).await;
        assert!(matches!(result, Err(SyncError::Persistence(_))));
        assert!(store.lock().is_dirty());
        assert!(!persistence.is_saving());
    }

    #[tokio::test]
    async fn test_no_engine() {
        let (store, persistence) = coordinator(Arc::new(NoEngine));
        store.lock().set("bus:a", Position::new(1.0, 2.0));

        assert_eq!(persistence.save(true).await, Ok(SaveOutcome::Unavailable));
        assert!(store.lock().is_dirty());
        assert!(persistence.restore().await.is_err());
    }

    #[tokio::test]
    async fn test_round_trip_into_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let (store, persistence) = coordinator(Arc::new(LocalEngine::with_state_dir(dir.path())));
        {
            let mut store = store.lock();
            store.set("source:prism:3", Position::new(240.0, 180.0));
            store.set("sink:1:0:2", Position::new(-5.5, 12.25));
            store.set_canvas(CanvasTransform::new(30.0, -40.0, 1.25).unwrap());
        }
        let saved = store.lock().snapshot();
        persistence.save(false).await.unwrap();

        let (fresh, reader) = coordinator(Arc::new(LocalEngine::with_state_dir(dir.path())));
        let restored = reader.restore().await.unwrap().unwrap();
        assert_eq!(merge_restored(&mut fresh.lock(), &restored), 2);

        assert_eq!(fresh.lock().snapshot(), saved);
        assert!(!fresh.lock().is_dirty());
    }

    #[test]
    fn test_merge_keeps_canvas_when_absent() {
        let mut store = PositionStore::new();
        store.set_canvas(CanvasTransform::new(1.0, 1.0, 2.0).unwrap());
        let mut restored = UiStateDescriptor::default();
        restored.positions.insert("bus:a".into(), Position::new(3.0, 4.0));

        assert_eq!(merge_restored(&mut store, &restored), 1);
        assert_eq!(store.canvas().scale, 2.0);
    }
}
