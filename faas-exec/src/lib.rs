//! # Function Execution Engine
//!
//! Runs stored Python and JavaScript functions inside a sandbox, either a
//! Docker container or an isolated local process, under a deadline.
//! Every invocation yields one [`ExecutionOutcome`] and one metrics record,
//! whether the function succeeded, failed, or timed out.

mod config;
pub mod docker;
mod error;
mod executor;
pub mod languages;
mod metrics;
pub mod sandbox;
mod service;
mod store;
mod types;

#[cfg(test)]
mod tests;

pub use config::EngineConfig;
pub use error::Error;
pub use executor::{ExecutionSupervisor, TIMEOUT_ERROR};
pub use languages::{materialize, ExecutableUnit, InputTransport};
pub use metrics::{InMemoryMetricsSink, MetricsRecord, MetricsSink, TracingMetricsSink};
pub use sandbox::{Backends, ContainerBackend, IsolatedProcessBackend, SandboxBackend};
pub use service::FunctionService;
pub use store::{FunctionStore, InMemoryFunctionStore};
pub use types::{
    BackendKind, ExecutionOutcome, FunctionSpec, InvocationInput, Language, ResourcePolicy,
    ResourceUsage, SandboxResult, DEFAULT_TIMEOUT_MS,
};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
