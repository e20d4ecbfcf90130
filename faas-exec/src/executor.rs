use serde::Deserialize;
use serde_json::{json, Value};
use std::{sync::Arc, time::Instant};
use tracing::{debug, error, info, warn};

use crate::{
    error::Error,
    languages::materialize,
    metrics::{MetricsRecord, MetricsSink},
    sandbox::{Backends, SandboxBackend},
    types::{
        ExecutionOutcome, FunctionSpec, InvocationInput, ResourcePolicy, ResourceUsage,
        SandboxResult,
    },
};

/// Prefix of the error reported when a function overruns its deadline
pub const TIMEOUT_ERROR: &str = "execution timed out";

/// The one-line report printed by every materialized program
#[derive(Debug, Deserialize)]
struct ProgramReport {
    #[serde(default)]
    result: Value,
    metrics: ReportedMetrics,
}

#[derive(Debug, Deserialize)]
struct ReportedMetrics {
    #[serde(default)]
    memory: Option<f64>,
    #[serde(default)]
    cpu: Option<f64>,
}

impl ExecutionOutcome {
    /// Whether this outcome reports a deadline overrun
    pub fn is_timeout(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(|e| e.starts_with(TIMEOUT_ERROR))
    }
}

/// Runs functions in their backend and turns whatever happens into an
/// [`ExecutionOutcome`] plus one metrics record.
pub struct ExecutionSupervisor {
    backends: Backends,
    metrics: Arc<dyn MetricsSink>,
    policy: ResourcePolicy,
}

impl ExecutionSupervisor {
    pub fn new(backends: Backends, metrics: Arc<dyn MetricsSink>, policy: ResourcePolicy) -> Self {
        Self {
            backends,
            metrics,
            policy,
        }
    }

    pub fn policy(&self) -> &ResourcePolicy {
        &self.policy
    }

    /// Execute `spec` against `input`. Never fails: every failure mode is
    /// folded into the returned outcome.
    pub async fn execute(&self, spec: &FunctionSpec, input: &InvocationInput) -> ExecutionOutcome {
        let start = Instant::now();
        let backend = self.backends.get(spec.backend);

        let result = self.run_in_backend(backend.as_ref(), spec, input).await;
        let elapsed = start.elapsed();

        let outcome = match result {
            Ok(sandbox) => interpret(&sandbox, spec.timeout_ms, elapsed),
            Err(e) => {
                error!(
                    "Backend {} failed for function {}: {}",
                    spec.backend, spec.id, e
                );
                ExecutionOutcome::failure(e.to_string(), elapsed)
            }
        };

        info!(
            "Function {} finished on {} in {}ms (success: {})",
            spec.id, spec.backend, outcome.execution_time_ms, outcome.success
        );

        self.record(spec, &outcome).await;
        outcome
    }

    async fn run_in_backend(
        &self,
        backend: &dyn SandboxBackend,
        spec: &FunctionSpec,
        input: &InvocationInput,
    ) -> Result<SandboxResult, Error> {
        let unit = materialize(spec.language, &spec.code, input, backend.input_transport())?;
        debug!(
            "Running function {} ({}) on {} with a {}ms deadline",
            spec.id,
            spec.language,
            backend.kind(),
            spec.timeout_ms
        );
        backend.run(&unit, &self.policy, spec.timeout()).await
    }

    async fn record(&self, spec: &FunctionSpec, outcome: &ExecutionOutcome) {
        let record = MetricsRecord::from_outcome(&spec.id, spec.backend, outcome);
        if let Err(e) = self.metrics.record_execution(&record).await {
            warn!("Failed to record metrics for function {}: {}", spec.id, e);
        }
    }
}

/// Map a finished sandbox run onto the result contract
pub(crate) fn interpret(
    sandbox: &SandboxResult,
    timeout_ms: u64,
    elapsed: std::time::Duration,
) -> ExecutionOutcome {
    if sandbox.timed_out {
        return ExecutionOutcome::failure(
            format!("{}: timeout after {}ms", TIMEOUT_ERROR, timeout_ms),
            elapsed,
        );
    }

    if sandbox.exit_failure {
        let stderr = sandbox.stderr_text.trim();
        let message = if !stderr.is_empty() {
            stderr.to_string()
        } else {
            match sandbox.exit_code {
                Some(code) => format!("program exited with status {}", code),
                None => "program was terminated by a signal".to_string(),
            }
        };
        return ExecutionOutcome::failure(message, elapsed);
    }

    let output = sandbox.output_text();
    let output = output.trim();
    match parse_report(output) {
        Some((result, usage)) => ExecutionOutcome::success(result, usage, elapsed),
        None => {
            debug!("Program output is not a result report, returning it verbatim");
            ExecutionOutcome::success(json!({ "output": output }), ResourceUsage::default(), elapsed)
        }
    }
}

fn parse_report(output: &str) -> Option<(Value, ResourceUsage)> {
    let report: ProgramReport = serde_json::from_str(output).ok()?;
    let usage = ResourceUsage {
        memory_bytes: report.metrics.memory.map(|m| m.max(0.0) as u64),
        cpu_time_ms: report.metrics.cpu,
    };
    Some((report.result, usage))
}
