//! Engine double for protocol tests: wraps `LocalEngine`, records cache and
//! persist traffic, and can delay or fail those calls on demand.

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::Value;
use spectrum_sync::api::dto::{OutputSinkDto, SourceIdDto, UIStateDto};
use spectrum_sync::{EngineClient, EngineError, EngineResult, LocalEngine, SyncConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub struct ScriptedEngine {
    pub inner: LocalEngine,
    advertised: bool,
    cache_writes: Mutex<Vec<UIStateDto>>,
    persist_calls: AtomicUsize,
    cache_delay: Mutex<Duration>,
    persist_delay: Mutex<Duration>,
    fail_cache: AtomicBool,
    fail_persist: AtomicBool,
    cache_in_flight: AtomicUsize,
    max_cache_in_flight: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::build(None, true)
    }

    pub fn with_state_dir(dir: impl Into<PathBuf>) -> Self {
        Self::build(Some(dir.into()), true)
    }

    /// Reachable, but the host does not say so
    pub fn unadvertised() -> Self {
        Self::build(None, false)
    }

    fn build(state_dir: Option<PathBuf>, advertised: bool) -> Self {
        Self {
            inner: LocalEngine::new(state_dir),
            advertised,
            cache_writes: Mutex::new(Vec::new()),
            persist_calls: AtomicUsize::new(0),
            cache_delay: Mutex::new(Duration::ZERO),
            persist_delay: Mutex::new(Duration::ZERO),
            fail_cache: AtomicBool::new(false),
            fail_persist: AtomicBool::new(false),
            cache_in_flight: AtomicUsize::new(0),
            max_cache_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_cache_delay(&self, delay: Duration) {
        *self.cache_delay.lock() = delay;
    }

    pub fn set_persist_delay(&self, delay: Duration) {
        *self.persist_delay.lock() = delay;
    }

    pub fn fail_cache(&self, fail: bool) {
        self.fail_cache.store(fail, Ordering::SeqCst);
    }

    pub fn fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    pub fn cache_writes(&self) -> Vec<UIStateDto> {
        self.cache_writes.lock().clone()
    }

    pub fn cache_write_count(&self) -> usize {
        self.cache_writes.lock().len()
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    pub fn max_cache_in_flight(&self) -> usize {
        self.max_cache_in_flight.load(Ordering::SeqCst)
    }
}

impl EngineClient for ScriptedEngine {
    fn is_advertised(&self) -> bool {
        self.advertised
    }

    async fn get_graph(&self) -> EngineResult<Value> {
        self.inner.get_graph().await
    }

    async fn add_source_node(&self, source_id: SourceIdDto, label: Option<String>) -> EngineResult<u32> {
        self.inner.add_source_node(source_id, label).await
    }

    async fn add_bus_node(&self, label: Option<String>, port_count: Option<u8>) -> EngineResult<u32> {
        self.inner.add_bus_node(label, port_count).await
    }

    async fn add_sink_node(&self, sink: OutputSinkDto, label: Option<String>) -> EngineResult<u32> {
        self.inner.add_sink_node(sink, label).await
    }

    async fn remove_node(&self, handle: u32) -> EngineResult<()> {
        self.inner.remove_node(handle).await
    }

    async fn add_edge(
        &self,
        source: u32,
        source_port: u8,
        target: u32,
        target_port: u8,
        gain: f32,
        muted: bool,
    ) -> EngineResult<u32> {
        self.inner
            .add_edge(source, source_port, target, target_port, gain, muted)
            .await
    }

    async fn remove_edge(&self, id: u32) -> EngineResult<()> {
        self.inner.remove_edge(id).await
    }

    async fn set_edge_gain(&self, id: u32, gain: f32) -> EngineResult<()> {
        self.inner.set_edge_gain(id, gain).await
    }

    async fn set_edge_muted(&self, id: u32, muted: bool) -> EngineResult<()> {
        self.inner.set_edge_muted(id, muted).await
    }

    async fn get_ui_state_cache(&self) -> EngineResult<Option<Value>> {
        self.inner.get_ui_state_cache().await
    }

    async fn set_ui_state_cache(&self, state: UIStateDto) -> EngineResult<()> {
        let now = self.cache_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_cache_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.cache_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.cache_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_cache.load(Ordering::SeqCst) {
            return Err(EngineError::Timeout);
        }
        self.cache_writes.lock().push(state.clone());
        self.inner.set_ui_state_cache(state).await
    }

    async fn persist_state(&self, state: UIStateDto) -> EngineResult<()> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.persist_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(EngineError::Io("disk full".to_string()));
        }
        self.inner.persist_state(state).await
    }

    async fn restore_state(&self) -> EngineResult<Option<Value>> {
        self.inner.restore_state().await
    }
}

/// Small, predictable tiling and the reference one-second debounce
pub fn test_config() -> SyncConfig {
    SyncConfig {
        debounce_ms: 1000,
        refresh_interval_ms: 1000,
        tile_origin_x: 0.0,
        tile_origin_y: 0.0,
        tile_step_x: 100.0,
        tile_step_y: 100.0,
        tile_wrap_width: 350.0,
        ..SyncConfig::default()
    }
}
