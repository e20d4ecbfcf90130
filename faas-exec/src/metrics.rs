//! Execution metrics and the sinks that receive them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::{
    error::Error,
    types::{BackendKind, ExecutionOutcome},
};

/// One record per invocation, whatever its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    pub function_id: String,
    pub execution_time_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Peak memory in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<u64>,
    /// CPU time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    pub backend: BackendKind,
}

impl MetricsRecord {
    pub fn from_outcome(function_id: &str, backend: BackendKind, outcome: &ExecutionOutcome) -> Self {
        Self {
            function_id: function_id.to_string(),
            execution_time_ms: outcome.execution_time_ms,
            success: outcome.success,
            error: outcome.error.clone(),
            memory_usage: outcome.resource_usage.memory_bytes,
            cpu_usage: outcome.resource_usage.cpu_time_ms,
            backend,
        }
    }
}

/// Durable destination for execution metrics
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_execution(&self, record: &MetricsRecord) -> Result<(), Error>;
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    records: RwLock<Vec<MetricsRecord>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<MetricsRecord> {
        self.records.read().await.clone()
    }

    pub async fn records_for(&self, function_id: &str) -> Vec<MetricsRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.function_id == function_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn record_execution(&self, record: &MetricsRecord) -> Result<(), Error> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

/// Emits each record as a structured log event
#[derive(Debug, Default)]
pub struct TracingMetricsSink;

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    async fn record_execution(&self, record: &MetricsRecord) -> Result<(), Error> {
        info!(
            function_id = %record.function_id,
            backend = %record.backend,
            success = record.success,
            execution_time_ms = record.execution_time_ms,
            memory_usage = ?record.memory_usage,
            cpu_usage = ?record.cpu_usage,
            error = ?record.error,
            "execution recorded"
        );
        Ok(())
    }
}
