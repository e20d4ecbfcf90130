use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default deadline for a function that does not configure one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Language::Python),
            "javascript" => Ok(Language::JavaScript),
            _ => Err(format!("Unsupported language: {}", s)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => f.write_str("python"),
            Language::JavaScript => f.write_str("javascript"),
        }
    }
}

/// Isolation backend a function runs under
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[default]
    #[serde(rename = "container", alias = "docker")]
    Container,
    #[serde(rename = "isolated-process", alias = "firecracker")]
    IsolatedProcess,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Container => "container",
            BackendKind::IsolatedProcess => "isolated-process",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container" | "docker" => Ok(BackendKind::Container),
            "isolated-process" | "firecracker" => Ok(BackendKind::IsolatedProcess),
            _ => Err(format!("Unsupported backend: {}", s)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored function, as read from the function store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Opaque identifier assigned by the store
    pub id: String,
    /// Unique, human readable name
    pub name: String,
    pub language: Language,
    /// Source code; must define a top-level `main(input)`
    pub code: String,
    /// Execution deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub backend: BackendKind,
}

impl FunctionSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Per-call input document, passed to `main` unchanged
pub type InvocationInput = Value;

/// Resource usage reported by the sandboxed program
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    /// Peak resident memory in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    /// User plus system CPU time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_time_ms: Option<f64>,
}

/// The single result contract returned for every invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    #[serde(default)]
    pub resource_usage: ResourceUsage,
}

impl ExecutionOutcome {
    pub fn success(result: Value, resource_usage: ResourceUsage, elapsed: Duration) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            execution_time_ms: elapsed.as_millis() as u64,
            resource_usage,
        }
    }

    pub fn failure(error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            execution_time_ms: elapsed.as_millis() as u64,
            resource_usage: ResourceUsage::default(),
        }
    }
}

/// Raw output of one sandboxed run, handed from a backend to the supervisor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SandboxResult {
    /// Captured output bytes (stdout, or stdout and stderr interleaved for containers)
    pub raw_output: Vec<u8>,
    /// The deadline fired before the program finished
    pub timed_out: bool,
    /// The program exited with a non-zero status
    pub exit_failure: bool,
    pub stderr_text: String,
    pub exit_code: Option<i64>,
}

impl SandboxResult {
    pub fn completed(raw_output: Vec<u8>, stderr_text: String, exit_code: Option<i64>) -> Self {
        Self {
            raw_output,
            timed_out: false,
            exit_failure: exit_code != Some(0),
            stderr_text,
            exit_code,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.raw_output).to_string()
    }
}

/// Resource policy applied to every sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcePolicy {
    /// Memory ceiling (bytes); swap is disabled
    pub memory_bytes: u64,
    /// Maximum CPU time (seconds)
    pub cpu_time_secs: u64,
    /// Maximum size of a written file (bytes)
    pub file_size_bytes: u64,
    pub network_disabled: bool,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            memory_bytes: 128 * 1024 * 1024,   // 128MB
            cpu_time_secs: 60,
            file_size_bytes: 10 * 1024 * 1024, // 10MB
            network_disabled: true,
        }
    }
}
