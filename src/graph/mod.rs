//! Local model of the engine's routing graph

pub mod edge;
pub mod mirror;
pub mod node;
pub mod stable_id;

pub use edge::{Edge, EdgeId};
pub use mirror::{GraphMirror, MirrorSnapshot, PendingKey};
pub use node::{Node, NodeHandle, NodeKind, NodeType, PluginInstance, PortId, SinkId, SourceOrigin};
