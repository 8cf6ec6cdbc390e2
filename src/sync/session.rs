//! SyncSession - the synchronization layer of one editor
//!
//! Owns the position store, the graph mirror, the cache pump, the
//! persistence coordinator and the refresh scheduler. Created at startup,
//! torn down with [`SyncSession::shutdown`].
//!
//! Graph edits are two-phase: the mirror is changed locally first and the
//! next refresh from the engine reconciles it. When the engine rejects a
//! call the session refreshes straight away so the local change is undone.

use super::persistence::{merge_restored, PersistenceCoordinator, SaveOutcome};
use super::pump::CachePump;
use super::scheduler::RefreshScheduler;
use crate::api::dto::{OutputSinkDto, SourceIdDto};
use crate::config::SyncConfig;
use crate::engine::{Availability, EngineClient, LocalEngine};
use crate::error::{SyncError, SyncResult};
use crate::graph::edge::{clamp_gain, Edge, EdgeId};
use crate::graph::mirror::{GraphMirror, MirrorSnapshot, PendingKey};
use crate::graph::node::{NodeHandle, PortId, SinkId, SourceOrigin};
use crate::graph::stable_id;
use crate::layout::position::{CanvasTransform, Position};
use crate::layout::store::PositionStore;
use crate::layout::tiling::TilingPolicy;
use crate::layout::SharedStore;
use crate::units;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What `startup` found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// Positions taken from the durable save
    pub restored: usize,
    /// Positions taken from the engine cache
    pub cached: usize,
    /// Handle-keyed positions found in old payloads
    pub legacy: usize,
    /// Of those, the ones whose handle the first refresh did not return
    pub legacy_dropped: usize,
    pub refreshed: bool,
}

pub struct SyncSession<E: EngineClient> {
    config: SyncConfig,
    engine: Arc<E>,
    availability: Availability,
    store: SharedStore,
    mirror: Arc<GraphMirror<E>>,
    pump: Arc<CachePump<E>>,
    persistence: Arc<PersistenceCoordinator<E>>,
    scheduler: RefreshScheduler,
}

impl SyncSession<LocalEngine> {
    /// Session over an in-process engine that keeps its state in the
    /// configured state directory
    pub fn local(config: SyncConfig) -> Self {
        let engine = LocalEngine::new(config.resolved_state_dir());
        Self::new(Arc::new(engine), config)
    }
}

impl<E: EngineClient> SyncSession<E> {
    pub fn new(engine: Arc<E>, config: SyncConfig) -> Self {
        let availability = Availability::for_engine(engine.as_ref());
        if !availability.is_available() {
            log::info!("[engine] not advertised; engine-facing work is off until a call succeeds");
        }

        let store: SharedStore = Arc::new(Mutex::new(PositionStore::new()));
        let mirror = GraphMirror::new(
            engine.clone(),
            availability.clone(),
            store.clone(),
            TilingPolicy::from(&config),
        );
        let pump = CachePump::new(
            engine.clone(),
            availability.clone(),
            store.clone(),
            config.debounce(),
        );
        let persistence = PersistenceCoordinator::new(engine.clone(), availability.clone(), store.clone());
        let scheduler = RefreshScheduler::new(config.refresh_interval());

        Self {
            config,
            engine,
            availability,
            store,
            mirror: Arc::new(mirror),
            pump: Arc::new(pump),
            persistence: Arc::new(persistence),
            scheduler,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn mirror(&self) -> &Arc<GraphMirror<E>> {
        &self.mirror
    }

    pub fn pump(&self) -> &Arc<CachePump<E>> {
        &self.pump
    }

    pub fn persistence(&self) -> &Arc<PersistenceCoordinator<E>> {
        &self.persistence
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn snapshot(&self) -> Arc<MirrorSnapshot> {
        self.mirror.snapshot()
    }

    pub fn position_of(&self, handle: NodeHandle) -> Option<Position> {
        self.mirror.position_of(handle)
    }

    fn ensure_available(&self) -> SyncResult<()> {
        if self.availability.is_available() {
            Ok(())
        } else {
            Err(SyncError::NotAvailable)
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Restore the layout, take the first snapshot of the graph and start
    /// polling.
    ///
    /// Order matters: the durable save is merged first, the engine cache on
    /// top of it (it is never older within one engine session), and only
    /// then is the graph fetched, so every node finds its position on the
    /// first refresh. Nothing here is fatal.
    pub async fn startup(&self) -> StartupReport {
        let mut report = StartupReport::default();
        let mut legacy = BTreeMap::new();

        match self.persistence.restore().await {
            Ok(Some(saved)) => {
                report.restored = merge_restored(&mut self.store.lock(), &saved);
                // The engine rekeys these against the file it read; any left
                // over name handles from a finished engine session.
                if !saved.legacy_by_handle.is_empty() {
                    log::warn!(
                        "[state] ignoring {} handle-keyed positions from the durable save",
                        saved.legacy_by_handle.len()
                    );
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("[state] durable restore failed: {}", e),
        }

        if self.availability.is_available() {
            match self.pump.fetch().await {
                Ok(Some(cached)) => {
                    report.cached = merge_restored(&mut self.store.lock(), &cached);
                    legacy.extend(cached.legacy_by_handle);
                }
                Ok(None) => {}
                Err(e) => log::warn!("[state] ui cache read failed: {}", e),
            }
        }

        // Old cache payloads keyed positions by handle. The cache lives in
        // the current engine session, so its handles are offered to the
        // first refresh and dropped if it does not claim them.
        let legacy_keys: Vec<PendingKey> = legacy
            .into_iter()
            .map(|(handle, position)| {
                let key = PendingKey::Handle(handle);
                self.mirror.record_pending(key.clone(), position);
                key
            })
            .collect();
        report.legacy = legacy_keys.len();

        if self.availability.is_available() {
            match self.mirror.refresh().await {
                Ok(()) => report.refreshed = true,
                Err(e) => log::warn!("[graph] initial refresh failed: {}", e),
            }
        }
        if report.refreshed {
            report.legacy_dropped = self.mirror.discard_pending(&legacy_keys);
        }

        self.start_polling();

        log::info!(
            "[state] startup: restored={} cached={} legacy={} (dropped {}) nodes={}",
            report.restored,
            report.cached,
            report.legacy,
            report.legacy_dropped,
            self.mirror.snapshot().node_count()
        );
        report
    }

    /// Start the periodic refresh. Ticks are skipped while no engine is
    /// available.
    pub fn start_polling(&self) {
        let mirror = Arc::clone(&self.mirror);
        let availability = self.availability.clone();
        self.scheduler.start(move || {
            let mirror = Arc::clone(&mirror);
            let availability = availability.clone();
            async move {
                if !availability.is_available() {
                    return;
                }
                if let Err(e) = mirror.refresh().await {
                    log::debug!("[graph] periodic refresh failed: {}", e);
                }
            }
        });
    }

    pub fn stop_polling(&self) {
        self.scheduler.stop();
    }

    /// Stop polling, drop the debounce window and save unconditionally.
    pub async fn shutdown(&self) -> SyncResult<SaveOutcome> {
        self.scheduler.stop();
        self.pump.cancel();
        let outcome = self.persistence.save(true).await;
        log::info!("[state] shutdown: final save {:?}", outcome);
        outcome
    }

    pub async fn refresh(&self) -> SyncResult<()> {
        self.ensure_available()?;
        self.mirror.refresh().await
    }

    /// Refresh after a rejected call; the engine's view wins
    async fn reconcile(&self) {
        if let Err(e) = self.mirror.refresh().await {
            log::warn!("[graph] reconcile refresh failed: {}", e);
        }
    }

    // =========================================================================
    // Layout
    // =========================================================================

    /// Drag a node. The change reaches the engine cache after the debounce.
    pub fn move_node(&self, handle: NodeHandle, position: Position) -> SyncResult<()> {
        if self.mirror.set_position(handle, position)? {
            self.pump.schedule();
        }
        Ok(())
    }

    /// Pan/zoom gesture ended. Flushed right away, not debounced.
    ///
    /// Returns `false` for an invalid transform, which is ignored.
    pub fn commit_canvas(&self, canvas: CanvasTransform) -> bool {
        if !self.store.lock().set_canvas(canvas) {
            return false;
        }
        self.pump.flush_soon();
        true
    }

    /// Durable save. `force` skips the dirty check.
    pub async fn save(&self, force: bool) -> SyncResult<SaveOutcome> {
        self.persistence.save(force).await
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    pub async fn add_source_node(
        &self,
        source: SourceIdDto,
        label: Option<String>,
        position: Option<Position>,
    ) -> SyncResult<NodeHandle> {
        self.ensure_available()?;
        let key = PendingKey::Stable(stable_id::for_source(&SourceOrigin::from(source.clone())));
        self.add_with_pending(key, position, self.engine.add_source_node(source, label))
            .await
    }

    pub async fn add_sink_node(
        &self,
        sink: OutputSinkDto,
        label: Option<String>,
        position: Option<Position>,
    ) -> SyncResult<NodeHandle> {
        self.ensure_available()?;
        let key = PendingKey::Stable(stable_id::for_sink(&SinkId::from(sink)));
        self.add_with_pending(key, position, self.engine.add_sink_node(sink, label))
            .await
    }

    /// The engine picks the bus id, so a requested position is keyed by
    /// the returned handle until the refresh reveals the stable id.
    pub async fn add_bus_node(
        &self,
        label: Option<String>,
        port_count: Option<u8>,
        position: Option<Position>,
    ) -> SyncResult<NodeHandle> {
        self.ensure_available()?;
        let raw = self
            .availability
            .observe(self.engine.add_bus_node(label, port_count).await)?;
        let handle = NodeHandle::from(raw);
        if let Some(position) = position {
            self.mirror.record_pending(PendingKey::Handle(handle), position);
        }
        self.after_add(handle).await;
        Ok(handle)
    }

    async fn add_with_pending(
        &self,
        key: PendingKey,
        position: Option<Position>,
        call: impl std::future::Future<Output = crate::engine::EngineResult<u32>>,
    ) -> SyncResult<NodeHandle> {
        if let Some(position) = position {
            self.mirror.record_pending(key.clone(), position);
        }
        match self.availability.observe(call.await) {
            Ok(raw) => {
                let handle = NodeHandle::from(raw);
                self.after_add(handle).await;
                Ok(handle)
            }
            Err(e) => {
                self.mirror.discard_pending([&key]);
                Err(e.into())
            }
        }
    }

    async fn after_add(&self, handle: NodeHandle) {
        self.reconcile().await;
        if let Some(id) = self.mirror.stable_id_of(handle) {
            log::debug!("[graph] added node {} as {}", handle, id);
        }
        self.pump.schedule();
    }

    /// Remove a node, its edges, and its remembered position.
    ///
    /// The position is only deleted once the engine confirms; a rejected
    /// removal comes back with the next refresh where it was.
    pub async fn remove_node(&self, handle: NodeHandle) -> SyncResult<()> {
        self.ensure_available()?;
        let stable = self.mirror.forget_node(handle);

        if let Err(e) = self.availability.observe(self.engine.remove_node(handle.raw()).await) {
            log::warn!("[graph] remove node {} rejected: {}", handle, e);
            self.reconcile().await;
            return Err(e.into());
        }

        if let Some(id) = stable {
            self.store.lock().delete(&id);
        }
        self.pump.schedule();
        Ok(())
    }

    // =========================================================================
    // Edges
    // =========================================================================

    pub async fn add_edge(
        &self,
        source: NodeHandle,
        source_port: PortId,
        target: NodeHandle,
        target_port: PortId,
        gain: f32,
        muted: bool,
    ) -> SyncResult<EdgeId> {
        self.ensure_available()?;
        let gain = clamp_gain(gain);
        let raw = self.availability.observe(
            self.engine
                .add_edge(
                    source.raw(),
                    source_port.into(),
                    target.raw(),
                    target_port.into(),
                    gain,
                    muted,
                )
                .await,
        )?;
        let id = EdgeId::from(raw);
        self.mirror
            .upsert_edge(Edge::new(id, source, source_port, target, target_port).with_params(gain, muted));
        Ok(id)
    }

    pub async fn remove_edge(&self, id: EdgeId) -> SyncResult<()> {
        self.ensure_available()?;
        self.mirror.forget_edge(id);
        if let Err(e) = self.availability.observe(self.engine.remove_edge(id.raw()).await) {
            log::warn!("[graph] remove edge {} rejected: {}", id, e);
            self.reconcile().await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Set an edge's linear gain; negative and NaN become 0
    pub async fn set_edge_gain(&self, id: EdgeId, gain: f32) -> SyncResult<()> {
        self.ensure_available()?;
        let gain = clamp_gain(gain);
        self.mirror.update_edge(id, |edge| edge.set_gain(gain));
        if let Err(e) = self.availability.observe(self.engine.set_edge_gain(id.raw(), gain).await) {
            log::warn!("[graph] set gain on edge {} rejected: {}", id, e);
            self.reconcile().await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn set_edge_gain_db(&self, id: EdgeId, db: f64) -> SyncResult<()> {
        self.set_edge_gain(id, units::db_to_gain(db) as f32).await
    }

    /// Set an edge's gain from a fader position (0-100)
    pub async fn set_edge_fader(&self, id: EdgeId, fader: f64) -> SyncResult<()> {
        self.set_edge_gain(id, units::fader_to_gain(fader) as f32).await
    }

    /// Fader position of an edge as currently mirrored
    pub fn edge_fader(&self, id: EdgeId) -> Option<f64> {
        let snapshot = self.mirror.snapshot();
        let edge = snapshot.get_edge(id)?;
        Some(units::gain_to_fader(edge.gain() as f64))
    }

    pub async fn set_edge_muted(&self, id: EdgeId, muted: bool) -> SyncResult<()> {
        self.ensure_available()?;
        self.mirror.update_edge(id, |edge| edge.muted = muted);
        if let Err(e) = self.availability.observe(self.engine.set_edge_muted(id.raw(), muted).await) {
            log::warn!("[graph] mute on edge {} rejected: {}", id, e);
            self.reconcile().await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NoEngine;

    fn config() -> SyncConfig {
        SyncConfig {
            tile_origin_x: 0.0,
            tile_origin_y: 0.0,
            tile_step_x: 100.0,
            tile_step_y: 100.0,
            tile_wrap_width: 150.0,
            ..SyncConfig::default()
        }
    }

    fn sink() -> OutputSinkDto {
        OutputSinkDto {
            device_id: 7,
            channel_offset: 0,
            channel_count: 2,
        }
    }

    #[tokio::test]
    async fn test_add_nodes_honor_requested_positions() {
        let session = SyncSession::new(Arc::new(LocalEngine::new(None)), config());

        let src = session
            .add_source_node(
                SourceIdDto::PrismChannel { channel: 1 },
                None,
                Some(Position::new(10.0, 20.0)),
            )
            .await
            .unwrap();
        let bus = session
            .add_bus_node(Some("FX".into()), None, Some(Position::new(30.0, 40.0)))
            .await
            .unwrap();
        let out = session.add_sink_node(sink(), None, None).await.unwrap();

        assert_eq!(session.position_of(src), Some(Position::new(10.0, 20.0)));
        assert_eq!(session.position_of(bus), Some(Position::new(30.0, 40.0)));
        assert_eq!(session.position_of(out), Some(Position::new(0.0, 0.0)));
        assert_eq!(session.mirror().pending_count(), 0);
        assert_eq!(session.store().lock().get("sink:7:0:2"), Some(Position::new(0.0, 0.0)));
    }

    #[tokio::test]
    async fn test_edges_apply_locally_and_in_engine() {
        let engine = Arc::new(LocalEngine::new(None));
        let session = SyncSession::new(engine.clone(), config());
        let src = session
            .add_source_node(SourceIdDto::PrismChannel { channel: 0 }, None, None)
            .await
            .unwrap();
        let out = session.add_sink_node(sink(), None, None).await.unwrap();

        let edge = session
            .add_edge(src, PortId::new(0), out, PortId::new(0), -1.0, false)
            .await
            .unwrap();
        assert_eq!(session.snapshot().get_edge(edge).unwrap().gain(), 0.0);

        session.set_edge_fader(edge, 74.3).await.unwrap();
        let gain = session.snapshot().get_edge(edge).unwrap().gain();
        assert!((gain - 1.0).abs() < 1e-4);
        assert!((session.edge_fader(edge).unwrap() - 74.3).abs() < 0.01);

        session.set_edge_gain_db(edge, -6.0).await.unwrap();
        session.set_edge_muted(edge, true).await.unwrap();
        session.refresh().await.unwrap();
        let mirrored = session.snapshot().get_edge(edge).cloned().unwrap();
        assert!(mirrored.muted);
        assert!((mirrored.gain() - 0.501_187).abs() < 1e-4);

        session.remove_edge(edge).await.unwrap();
        assert_eq!(engine.edge_count(), 0);
        assert!(session.snapshot().get_edge(edge).is_none());
    }

    #[tokio::test]
    async fn test_rejected_removal_is_reconciled() {
        let session = SyncSession::new(Arc::new(LocalEngine::new(None)), config());
        let src = session
            .add_source_node(SourceIdDto::PrismChannel { channel: 0 }, None, None)
            .await
            .unwrap();
        let out = session.add_sink_node(sink(), None, None).await.unwrap();
        let edge = session
            .add_edge(src, PortId::new(0), out, PortId::new(0), 1.0, false)
            .await
            .unwrap();

        session.remove_edge(edge).await.unwrap();
        // Second removal: the engine no longer knows the edge
        assert!(session.remove_edge(edge).await.is_err());
        assert!(session.snapshot().get_edge(edge).is_none());
    }

    #[tokio::test]
    async fn test_remove_node_deletes_position() {
        let engine = Arc::new(LocalEngine::new(None));
        let session = SyncSession::new(engine.clone(), config());
        let src = session
            .add_source_node(SourceIdDto::PrismChannel { channel: 2 }, None, None)
            .await
            .unwrap();
        assert!(session.store().lock().contains("source:prism:2"));

        session.remove_node(src).await.unwrap();
        assert!(!session.store().lock().contains("source:prism:2"));
        assert!(session.snapshot().get_node(src).is_none());
        assert_eq!(engine.node_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_canvas_is_ignored() {
        let session = SyncSession::new(Arc::new(LocalEngine::new(None)), config());
        let bad = CanvasTransform {
            x: 0.0,
            y: 0.0,
            scale: 0.0,
        };
        assert!(!session.commit_canvas(bad));
        assert_eq!(session.store().lock().canvas(), CanvasTransform::default());
    }

    #[tokio::test]
    async fn test_no_engine_mode() {
        let session = SyncSession::new(Arc::new(NoEngine), config());

        let report = session.startup().await;
        assert!(!report.refreshed);
        assert_eq!(
            session
                .add_source_node(SourceIdDto::PrismChannel { channel: 0 }, None, None)
                .await,
            Err(SyncError::NotAvailable)
        );
        assert_eq!(session.refresh().await, Err(SyncError::NotAvailable));
        assert_eq!(session.shutdown().await, Ok(SaveOutcome::Unavailable));
        assert!(!session.scheduler().is_running());
    }
}
