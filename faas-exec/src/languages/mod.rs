//! Language runtimes and the code materializer.
//!
//! A materialized program wraps the user's code so that it decodes the
//! invocation input, calls `main(input)` and prints exactly one JSON line
//! of the form `{"result": ..., "metrics": {"memory": ..., "cpu": ...}}`.

mod javascript;
mod python;

pub use javascript::JavaScriptRuntime;
pub use python::PythonRuntime;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::path::PathBuf;
use which::which;

use crate::{
    error::Error,
    types::{InvocationInput, Language},
};

/// How the invocation input reaches the program inside the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTransport {
    /// Base64 literal embedded in the program text
    Embedded,
    /// JSON document passed as the first program argument
    Argument,
}

/// Where a rendered program reads its input from
pub enum InputSource<'a> {
    /// Base64 encoded JSON; the alphabet cannot terminate a string literal
    Literal(&'a str),
    Argument,
}

/// Per-language knowledge needed to materialize and launch a program
pub trait LanguageRuntime: Send + Sync {
    fn language(&self) -> Language;

    /// Conventional name of the generated source file
    fn file_name(&self) -> &'static str;

    /// Interpreter looked up on the host `PATH`
    fn host_interpreter(&self) -> &'static str;

    /// Interpreter inside the runtime image
    fn container_interpreter(&self) -> &'static str;

    /// Flag that makes the interpreter run program text given on the command line
    fn inline_flag(&self) -> &'static str;

    /// Render the wrapper program around `user_code`
    fn render(&self, user_code: &str, input: &InputSource<'_>) -> String;

    /// Resolve the host interpreter
    fn check_tools(&self) -> Result<PathBuf, Error> {
        which(self.host_interpreter()).map_err(|e| {
            Error::BackendCreation(format!(
                "Interpreter {} not available: {}",
                self.host_interpreter(),
                e
            ))
        })
    }
}

static PYTHON: PythonRuntime = PythonRuntime;
static JAVASCRIPT: JavaScriptRuntime = JavaScriptRuntime;

pub fn runtime_for(language: Language) -> &'static dyn LanguageRuntime {
    match language {
        Language::Python => &PYTHON,
        Language::JavaScript => &JAVASCRIPT,
    }
}

/// A self-contained program ready to be handed to a sandbox backend
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableUnit {
    pub language: Language,
    pub file_name: &'static str,
    pub source: String,
    /// Program arguments following the source file (or inline program)
    pub args: Vec<String>,
}

impl ExecutableUnit {
    pub fn runtime(&self) -> &'static dyn LanguageRuntime {
        runtime_for(self.language)
    }

    /// Command line running the program text inline, e.g. `python -c <source>`
    pub fn inline_command(&self) -> Vec<String> {
        let runtime = self.runtime();
        let mut cmd = vec![
            runtime.container_interpreter().to_string(),
            runtime.inline_flag().to_string(),
            self.source.clone(),
        ];
        cmd.extend(self.args.iter().cloned());
        cmd
    }
}

/// Produce the executable wrapper for `user_code` and `input`.
pub fn materialize(
    language: Language,
    user_code: &str,
    input: &InvocationInput,
    transport: InputTransport,
) -> Result<ExecutableUnit, Error> {
    let runtime = runtime_for(language);
    let document = serde_json::to_string(input)
        .map_err(|e| Error::Materialize(format!("Failed to encode input: {}", e)))?;

    let (source, args) = match transport {
        InputTransport::Embedded => {
            let encoded = BASE64.encode(document.as_bytes());
            (
                runtime.render(user_code, &InputSource::Literal(&encoded)),
                Vec::new(),
            )
        }
        InputTransport::Argument => (
            runtime.render(user_code, &InputSource::Argument),
            vec![document],
        ),
    };

    Ok(ExecutableUnit {
        language,
        file_name: runtime.file_name(),
        source,
        args,
    })
}

#[cfg(test)]
pub(crate) fn skip_if_not_available(tools: &[&str]) -> bool {
    let missing: Vec<_> = tools
        .iter()
        .filter(|tool| which(**tool).is_err())
        .map(|s| (*s).to_string())
        .collect();

    if !missing.is_empty() {
        eprintln!("Skipping test: {} not available", missing.join(", "));
        return true;
    }
    false
}
