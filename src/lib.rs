#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod loom;

pub mod array;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod list;
pub mod node;
pub mod status;
pub mod table;

/// A task's identity in a DAG. Nodes are addressed by key rather than by
/// handle, since a dynamic DAG discovers keys from user code before any
/// node object exists to hand back.
pub type Key = i64;

pub use config::Config;
pub use diagnostics::{Metrics, MetricsSnapshot};
pub use error::{task_error, task_error_msg, GraphError, GraphResult};
pub use node::{ComputeContext, DynamicTask, GenerateContext, InitContext, StaticTask};
pub use status::NodeStatus;
