use super::{
    fixtures::{code_samples::*, failure_scenarios::*},
    utils::{
        defaults::{default_test_policy, function_spec},
        fakes::FakeBackend,
    },
};
use crate::{
    languages::skip_if_not_available, Backends, BackendKind, ExecutionSupervisor,
    InMemoryMetricsSink, IsolatedProcessBackend, Language, ResourcePolicy, Result,
};
use serde_json::json;
use std::{path::Path, sync::Arc, time::Instant};
use tempfile::TempDir;

/// Supervisor with a real process backend; container runs are never expected here
fn process_supervisor(scratch_root: &Path) -> (ExecutionSupervisor, Arc<InMemoryMetricsSink>) {
    supervisor_with_policy(scratch_root, default_test_policy())
}

fn supervisor_with_policy(
    scratch_root: &Path,
    policy: ResourcePolicy,
) -> (ExecutionSupervisor, Arc<InMemoryMetricsSink>) {
    let metrics = Arc::new(InMemoryMetricsSink::new());
    let backends = Backends::new(
        Arc::new(FakeBackend::printing(BackendKind::Container, "")),
        Arc::new(IsolatedProcessBackend::new(scratch_root)),
    );
    let supervisor = ExecutionSupervisor::new(backends, metrics.clone(), policy);
    (supervisor, metrics)
}

fn residual_entries(root: &Path) -> usize {
    std::fs::read_dir(root).map(|dir| dir.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_javascript_add() -> Result<()> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let (supervisor, metrics) = process_supervisor(root.path());
    let spec = function_spec(Language::JavaScript, BackendKind::IsolatedProcess, JS_ADD, 5000);

    let outcome = supervisor.execute(&spec, &json!({"x": 5, "y": 3})).await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(outcome.result, Some(json!(8)));
    assert!(outcome.resource_usage.memory_bytes.is_some());
    assert_eq!(metrics.records_for(&spec.id).await.len(), 1);
    assert_eq!(residual_entries(root.path()), 0);
    Ok(())
}

#[tokio::test]
async fn test_python_add() -> Result<()> {
    if skip_if_not_available(&["python3"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let (supervisor, _) = process_supervisor(root.path());
    let spec = function_spec(Language::Python, BackendKind::IsolatedProcess, PYTHON_ADD, 5000);

    let outcome = supervisor.execute(&spec, &json!({"x": 5, "y": 3})).await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(outcome.result, Some(json!(8)));
    assert!(outcome.resource_usage.cpu_time_ms.is_some());
    Ok(())
}

#[tokio::test]
async fn test_helpers_and_async_main() -> Result<()> {
    if skip_if_not_available(&["python3", "node"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let (supervisor, _) = process_supervisor(root.path());

    let spec = function_spec(Language::Python, BackendKind::IsolatedProcess, PYTHON_HELPERS, 5000);
    let outcome = supervisor.execute(&spec, &json!({"r": 1})).await;
    assert_eq!(outcome.result, Some(json!({"area": 3.14})));

    let spec = function_spec(Language::JavaScript, BackendKind::IsolatedProcess, JS_ASYNC, 5000);
    let outcome = supervisor.execute(&spec, &json!({"n": 21})).await;
    assert_eq!(outcome.result, Some(json!({"doubled": 42})));
    Ok(())
}

#[tokio::test]
async fn test_infinite_loop_times_out() -> Result<()> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let (supervisor, metrics) = process_supervisor(root.path());
    let spec = function_spec(
        Language::JavaScript,
        BackendKind::IsolatedProcess,
        JS_INFINITE_LOOP,
        1000,
    );

    let outcome = supervisor.execute(&spec, &json!({})).await;
    assert!(!outcome.success);
    assert!(outcome.is_timeout());
    assert!(outcome.error.as_deref().unwrap_or_default().contains("timeout"));
    assert!(outcome.result.is_none());
    assert!(outcome.execution_time_ms >= 1000);
    assert!(outcome.execution_time_ms < 2500);

    let records = metrics.records_for(&spec.id).await;
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(residual_entries(root.path()), 0);
    Ok(())
}

#[tokio::test]
async fn test_python_infinite_loop_times_out() -> Result<()> {
    if skip_if_not_available(&["python3"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let (supervisor, _) = process_supervisor(root.path());
    let spec = function_spec(
        Language::Python,
        BackendKind::IsolatedProcess,
        PYTHON_INFINITE_LOOP,
        1000,
    );

    let outcome = supervisor.execute(&spec, &json!({})).await;
    assert!(!outcome.success);
    assert!(outcome.is_timeout(), "error: {:?}", outcome.error);
    assert!(outcome.execution_time_ms >= 1000);
    assert!(outcome.execution_time_ms < 2500);
    assert_eq!(residual_entries(root.path()), 0);
    Ok(())
}

#[tokio::test]
async fn test_deadline_beyond_cpu_limit_is_a_timeout() -> Result<()> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let policy = ResourcePolicy {
        cpu_time_secs: 1,
        ..default_test_policy()
    };
    let (supervisor, _) = supervisor_with_policy(root.path(), policy);
    let spec = function_spec(
        Language::JavaScript,
        BackendKind::IsolatedProcess,
        JS_INFINITE_LOOP,
        4000,
    );

    let outcome = supervisor.execute(&spec, &json!({})).await;
    assert!(!outcome.success);
    assert!(outcome.is_timeout(), "error: {:?}", outcome.error);
    assert!(outcome.execution_time_ms >= 4000);
    Ok(())
}

#[tokio::test]
async fn test_lingering_grandchild_does_not_fail_the_call() -> Result<()> {
    if skip_if_not_available(&["node", "sleep"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let (supervisor, _) = process_supervisor(root.path());

    for code in [JS_SPAWNS_CHILD, JS_SPAWNS_DETACHED_CHILD] {
        let spec = function_spec(Language::JavaScript, BackendKind::IsolatedProcess, code, 10_000);
        let start = Instant::now();
        let outcome = supervisor.execute(&spec, &json!({})).await;
        assert!(outcome.success, "error: {:?}", outcome.error);
        assert_eq!(outcome.result, Some(json!(1)));
        // neither the sleep nor its open stdout holds the call for its 3 seconds
        assert!(start.elapsed().as_millis() < 2500, "took {:?}", start.elapsed());
    }
    Ok(())
}

#[tokio::test]
async fn test_undefined_identifier_fails() -> Result<()> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let (supervisor, _) = process_supervisor(root.path());
    let spec = function_spec(Language::JavaScript, BackendKind::IsolatedProcess, JS_UNDEFINED, 5000);

    let outcome = supervisor.execute(&spec, &json!({})).await;
    assert!(!outcome.success);
    assert!(!outcome.is_timeout());
    assert!(outcome.result.is_none());
    assert!(outcome
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("ReferenceError"));
    Ok(())
}

#[tokio::test]
async fn test_program_errors_surface_stderr() -> Result<()> {
    if skip_if_not_available(&["python3", "node"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let (supervisor, _) = process_supervisor(root.path());

    let cases = [
        (Language::Python, PYTHON_RAISES, "ValueError"),
        (Language::JavaScript, JS_REJECTS, "rejected"),
        (Language::JavaScript, JS_SYNTAX_ERROR, "SyntaxError"),
    ];
    for (language, code, expected) in cases {
        let spec = function_spec(language, BackendKind::IsolatedProcess, code, 5000);
        let outcome = supervisor.execute(&spec, &json!({})).await;
        assert!(!outcome.success);
        let error = outcome.error.unwrap_or_default();
        assert!(error.contains(expected), "{expected} not in {error}");
    }
    Ok(())
}

#[tokio::test]
async fn test_unstructured_output_is_returned_raw() -> Result<()> {
    if skip_if_not_available(&["python3", "node"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let (supervisor, _) = process_supervisor(root.path());

    for (language, code) in [
        (Language::JavaScript, JS_PRINTS_TEXT),
        (Language::Python, PYTHON_PRINTS_TEXT),
    ] {
        let spec = function_spec(language, BackendKind::IsolatedProcess, code, 5000);
        let outcome = supervisor.execute(&spec, &json!({})).await;
        assert!(outcome.success, "error: {:?}", outcome.error);
        assert_eq!(outcome.result, Some(json!({"output": "diagnostic text"})));
    }
    Ok(())
}

#[tokio::test]
async fn test_sequential_runs_are_independent() -> Result<()> {
    if skip_if_not_available(&["python3"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let (supervisor, metrics) = process_supervisor(root.path());
    let spec = function_spec(Language::Python, BackendKind::IsolatedProcess, PYTHON_ECHO, 5000);

    for n in 0..3 {
        let outcome = supervisor.execute(&spec, &json!({"n": n})).await;
        assert_eq!(outcome.result, Some(json!({"n": n})));
    }
    assert_eq!(metrics.records_for(&spec.id).await.len(), 3);
    assert_eq!(residual_entries(root.path()), 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_runs() -> Result<()> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let root = TempDir::new()?;
    let (supervisor, _) = process_supervisor(root.path());
    let supervisor = Arc::new(supervisor);
    let spec = function_spec(Language::JavaScript, BackendKind::IsolatedProcess, JS_ECHO, 5000);

    let mut handles = vec![];
    for n in 0..4 {
        let supervisor = supervisor.clone();
        let spec = spec.clone();
        handles.push(tokio::spawn(async move {
            supervisor.execute(&spec, &json!({"n": n})).await
        }));
    }

    for (n, handle) in handles.into_iter().enumerate() {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.result, Some(json!({"n": n})));
    }
    assert_eq!(residual_entries(root.path()), 0);
    Ok(())
}
