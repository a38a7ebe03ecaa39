//! Runtime for building externally-tracked data-transfer connectors.
//!
//! A connector implements [`Connector`] to stage its tables; the
//! [`ConnectorRuntime`] does the rest: it consumes trigger messages (from a
//! run file or a queue subscription), wraps every run in a
//! [`LifecycleCoordinator`] scope that heartbeats buffered log messages to
//! the tracking service and enforces a wall-clock timeout, triggers the
//! destination load, and settles each queue message according to how the
//! run ended.

pub mod config;
pub mod coordination;
pub mod error;
pub mod logging;
pub mod model;
pub mod queue;
pub mod runner;
pub mod staging;
pub mod tracking;

pub use coordination::{LifecycleCoordinator, LifecycleOptions, LifecycleOutcome, RunContext};
pub use error::ConnectorError;
pub use model::{RunDescriptor, RunState};
pub use runner::{ConnectorRuntime, RuntimeOptions};
pub use staging::{Connector, TableArtifact, TableStager, Uploader};
