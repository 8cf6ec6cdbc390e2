//! Engine stand-in for environments without an engine (previews, harnesses)

use super::{EngineClient, EngineError, EngineResult};
use crate::api::dto::{OutputSinkDto, SourceIdDto, UIStateDto};
use serde_json::Value;

/// Never advertised, every call fails as unreachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEngine;

fn unreachable<T>() -> EngineResult<T> {
    Err(EngineError::Unreachable("no engine in this environment".to_string()))
}

impl EngineClient for NoEngine {
    fn is_advertised(&self) -> bool {
        false
    }

    async fn get_graph(&self) -> EngineResult<Value> {
        unreachable()
    }

    async fn add_source_node(&self, _source_id: SourceIdDto, _label: Option<String>) -> EngineResult<u32> {
        unreachable()
    }

    async fn add_bus_node(&self, _label: Option<String>, _port_count: Option<u8>) -> EngineResult<u32> {
        unreachable()
    }

    async fn add_sink_node(&self, _sink: OutputSinkDto, _label: Option<String>) -> EngineResult<u32> {
        unreachable()
    }

    async fn remove_node(&self, _handle: u32) -> EngineResult<()> {
        unreachable()
    }

    async fn add_edge(
        &self,
        _source: u32,
        _source_port: u8,
        _target: u32,
        _target_port: u8,
        _gain: f32,
        _muted: bool,
    ) -> EngineResult<u32> {
        unreachable()
    }

    async fn remove_edge(&self, _id: u32) -> EngineResult<()> {
        unreachable()
    }

    async fn set_edge_gain(&self, _id: u32, _gain: f32) -> EngineResult<()> {
        unreachable()
    }

    async fn set_edge_muted(&self, _id: u32, _muted: bool) -> EngineResult<()> {
        unreachable()
    }

    async fn get_ui_state_cache(&self) -> EngineResult<Option<Value>> {
        unreachable()
    }

    async fn set_ui_state_cache(&self, _state: UIStateDto) -> EngineResult<()> {
        unreachable()
    }

    async fn persist_state(&self, _state: UIStateDto) -> EngineResult<()> {
        unreachable()
    }

    async fn restore_state(&self) -> EngineResult<Option<Value>> {
        unreachable()
    }
}
