use async_trait::async_trait;
use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::{
    fs,
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    task::JoinHandle,
    time::{self, Duration},
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    error::Error,
    languages::{ExecutableUnit, InputTransport},
    sandbox::SandboxBackend,
    types::{BackendKind, ResourcePolicy, SandboxResult},
};

/// Single-use working directory for one invocation, removed on drop
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `<root>/invocation-<unix millis>-<uuid>`
    pub async fn create(root: &Path) -> Result<Self, Error> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let path = root.join(format!("invocation-{}-{}", millis, Uuid::new_v4().simple()));

        fs::create_dir_all(&path).await.map_err(|e| {
            Error::BackendCreation(format!("Failed to create scratch directory: {}", e))
        })?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            error!(
                "Failed to clean up scratch directory {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Runs the program as a plain child process of the host
pub struct IsolatedProcessBackend {
    scratch_root: PathBuf,
    /// Upper bound on reaping a killed child and draining its pipes
    kill_grace: Duration,
}

impl IsolatedProcessBackend {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            kill_grace: Duration::from_millis(500),
        }
    }

    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Wait for a pipe to close, keeping whatever was read if it stays open
    async fn drain(&self, mut reader: PipeReader) -> Result<Vec<u8>, Error> {
        match time::timeout(self.kill_grace, &mut reader.task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => return Err(Error::Stream(format!("Failed to read output: {}", e))),
            Ok(Err(e)) => return Err(Error::Stream(format!("Output reader failed: {}", e))),
            Err(_) => {
                warn!(
                    "Output pipe still open {:?} after the process exited, keeping partial output",
                    self.kill_grace
                );
                reader.task.abort();
            }
        }
        Ok(reader.take())
    }
}

/// One captured pipe. Bytes land in `buffer` as they are read, so an
/// abandoned reader still leaves its partial output behind.
struct PipeReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<io::Result<()>>,
}

impl PipeReader {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let task = tokio::spawn(async move {
            if let Some(mut pipe) = pipe {
                let mut chunk = [0u8; 8192];
                loop {
                    let n = pipe.read(&mut chunk).await?;
                    if n == 0 {
                        break;
                    }
                    lock(&sink).extend_from_slice(&chunk[..n]);
                }
            }
            Ok(())
        });
        Self { buffer, task }
    }

    fn abort(&self) {
        self.task.abort();
    }

    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.buffer))
    }
}

fn lock(buffer: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// CPU seconds granted to a run: the policy limit, raised so that the
/// kernel never kills the program before its deadline does
pub(crate) fn cpu_limit_secs(policy: &ResourcePolicy, timeout: Duration) -> u64 {
    let deadline_secs = timeout.as_millis().div_ceil(1000) as u64;
    policy.cpu_time_secs.max(deadline_secs + 1)
}

/// SIGKILL every process left in the program's process group
fn kill_group(pgid: Option<u32>) {
    let Some(pgid) = pgid else {
        return;
    };
    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

fn apply_limits(command: &mut Command, cpu_time_secs: u64, file_size_bytes: u64) {
    #[cfg(target_os = "linux")]
    {
        use nix::sys::resource::{setrlimit, Resource};

        unsafe {
            command.pre_exec(move || {
                setrlimit(Resource::RLIMIT_CPU, cpu_time_secs, cpu_time_secs)
                    .map_err(io::Error::from)?;
                setrlimit(Resource::RLIMIT_FSIZE, file_size_bytes, file_size_bytes)
                    .map_err(io::Error::from)?;
                Ok(())
            });
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = (command, cpu_time_secs, file_size_bytes);
        warn!("Resource limits are only enforced on Linux");
    }
}

#[async_trait]
impl SandboxBackend for IsolatedProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::IsolatedProcess
    }

    fn input_transport(&self) -> InputTransport {
        InputTransport::Argument
    }

    async fn run(
        &self,
        unit: &ExecutableUnit,
        policy: &ResourcePolicy,
        timeout: Duration,
    ) -> Result<SandboxResult, Error> {
        let scratch = ScratchDir::create(&self.scratch_root).await?;
        let interpreter = unit.runtime().check_tools()?;

        let source_path = scratch.path().join(unit.file_name);
        fs::write(&source_path, &unit.source).await.map_err(|e| {
            Error::BackendCreation(format!("Failed to write {}: {}", unit.file_name, e))
        })?;

        debug!("Process sandbox - Interpreter: {}", interpreter.display());
        debug!("Process sandbox - Scratch dir: {}", scratch.path().display());

        let mut command = Command::new(&interpreter);
        command
            .arg(&source_path)
            .args(&unit.args)
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .env("HOME", scratch.path())
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        apply_limits(
            &mut command,
            cpu_limit_secs(policy, timeout),
            policy.file_size_bytes,
        );

        let mut child = command.spawn().map_err(|e| {
            Error::BackendCreation(format!(
                "Failed to spawn {}: {}",
                interpreter.display(),
                e
            ))
        })?;
        // the child leads its own group, so the group id is its pid
        let pgid = child.id();

        let stdout = PipeReader::spawn(child.stdout.take());
        let stderr = PipeReader::spawn(child.stderr.take());

        let status = match time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                kill_group(pgid);
                stdout.abort();
                stderr.abort();
                return Err(Error::Stream(format!("Failed to wait for process: {}", e)));
            }
            Err(_) => {
                warn!("Process exceeded its {:?} deadline, killing it", timeout);
                kill_group(pgid);
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill timed out process: {}", e);
                }
                if time::timeout(self.kill_grace, child.wait()).await.is_err() {
                    warn!("Killed process was not reaped within {:?}", self.kill_grace);
                }
                stdout.abort();
                stderr.abort();
                return Ok(SandboxResult::timed_out());
            }
        };

        // descendants the program left running must not outlive the invocation
        kill_group(pgid);
        let (stdout, stderr) = tokio::join!(self.drain(stdout), self.drain(stderr));

        Ok(SandboxResult::completed(
            stdout?,
            String::from_utf8_lossy(&stderr?).into_owned(),
            status.code().map(i64::from),
        ))
    }
}
