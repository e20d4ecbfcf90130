pub mod defaults {
    use crate::{BackendKind, FunctionSpec, Language, ResourcePolicy};
    use tokio::time::Duration;

    pub fn default_test_policy() -> ResourcePolicy {
        ResourcePolicy {
            memory_bytes: 128 * 1024 * 1024, // 128MB
            cpu_time_secs: 10,
            file_size_bytes: 1024 * 1024, // 1MB
            network_disabled: true,
        }
    }

    pub fn default_timeout() -> Duration {
        Duration::from_secs(5)
    }

    pub fn function_spec(
        language: Language,
        backend: BackendKind,
        code: &str,
        timeout_ms: u64,
    ) -> FunctionSpec {
        FunctionSpec {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("test-{}-{}", language, backend),
            language,
            code: code.to_string(),
            timeout_ms,
            backend,
        }
    }
}

pub mod fakes {
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use crate::{
        docker::{ContainerConfig, ContainerRuntime, LogStream},
        BackendKind, Error, ExecutableUnit, InputTransport, MetricsRecord, MetricsSink,
        ResourcePolicy, SandboxBackend, SandboxResult,
    };

    /// What a [`FakeBackend`] does when run
    pub enum Behavior {
        Complete(SandboxResult),
        Fail(String),
        /// Sleep past any reasonable deadline, then report a timeout
        Hang,
    }

    pub struct FakeBackend {
        kind: BackendKind,
        transport: InputTransport,
        behavior: Behavior,
        runs: AtomicUsize,
        last_unit: Mutex<Option<ExecutableUnit>>,
    }

    impl FakeBackend {
        pub fn new(kind: BackendKind, behavior: Behavior) -> Self {
            let transport = match kind {
                BackendKind::Container => InputTransport::Embedded,
                BackendKind::IsolatedProcess => InputTransport::Argument,
            };
            Self {
                kind,
                transport,
                behavior,
                runs: AtomicUsize::new(0),
                last_unit: Mutex::new(None),
            }
        }

        pub fn printing(kind: BackendKind, stdout: &str) -> Self {
            Self::new(
                kind,
                Behavior::Complete(SandboxResult::completed(
                    stdout.as_bytes().to_vec(),
                    String::new(),
                    Some(0),
                )),
            )
        }

        pub fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }

        pub fn last_unit(&self) -> Option<ExecutableUnit> {
            self.last_unit.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SandboxBackend for FakeBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn input_transport(&self) -> InputTransport {
            self.transport
        }

        async fn run(
            &self,
            unit: &ExecutableUnit,
            _policy: &ResourcePolicy,
            timeout: Duration,
        ) -> Result<SandboxResult, Error> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            *self.last_unit.lock().unwrap() = Some(unit.clone());
            match &self.behavior {
                Behavior::Complete(result) => Ok(result.clone()),
                Behavior::Fail(message) => Err(Error::BackendCreation(message.clone())),
                Behavior::Hang => {
                    tokio::time::sleep(timeout).await;
                    Ok(SandboxResult::timed_out())
                }
            }
        }
    }

    /// Metrics sink that rejects every record
    pub struct FailingMetricsSink {
        pub attempts: AtomicUsize,
    }

    impl FailingMetricsSink {
        pub fn new() -> Self {
            Self {
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetricsSink for FailingMetricsSink {
        async fn record_execution(&self, _record: &MetricsRecord) -> Result<(), Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::Metrics("metrics store unavailable".to_string()))
        }
    }

    #[derive(Default)]
    struct RuntimeState {
        next_id: usize,
        live: HashSet<String>,
        stopped: Vec<String>,
        configs: Vec<ContainerConfig>,
    }

    /// In-process stand-in for the Docker daemon
    #[derive(Default)]
    pub struct FakeContainerRuntime {
        /// Framed log bytes the container "prints"
        pub log_bytes: Vec<u8>,
        pub exit_code: i64,
        pub fail_create: bool,
        pub fail_start: bool,
        /// The log stream never ends, as for a program that never returns
        pub hang_logs: bool,
        /// The stop request never answers
        pub hang_stop: bool,
        state: Mutex<RuntimeState>,
    }

    impl FakeContainerRuntime {
        pub fn with_output(log_bytes: Vec<u8>, exit_code: i64) -> Self {
            Self {
                log_bytes,
                exit_code,
                ..Self::default()
            }
        }

        /// A container whose program never returns; `stop` optionally never answers
        pub fn hanging(unresponsive_stop: bool) -> Self {
            Self {
                hang_logs: true,
                hang_stop: unresponsive_stop,
                ..Self::default()
            }
        }

        pub fn failing_create() -> Self {
            Self {
                fail_create: true,
                ..Self::default()
            }
        }

        pub fn failing_start() -> Self {
            Self {
                fail_start: true,
                ..Self::default()
            }
        }

        pub fn live_containers(&self) -> usize {
            self.state.lock().unwrap().live.len()
        }

        pub fn created(&self) -> usize {
            self.state.lock().unwrap().next_id
        }

        pub fn stopped(&self) -> Vec<String> {
            self.state.lock().unwrap().stopped.clone()
        }

        pub fn last_config(&self) -> Option<ContainerConfig> {
            self.state.lock().unwrap().configs.last().cloned()
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeContainerRuntime {
        async fn create(&self, config: &ContainerConfig) -> Result<String, Error> {
            if self.fail_create {
                return Err(Error::Docker {
                    status: 404,
                    message: format!("No such image: {}", config.image),
                });
            }
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("container-{}", state.next_id);
            state.live.insert(id.clone());
            state.configs.push(config.clone());
            Ok(id)
        }

        async fn start(&self, _id: &str) -> Result<(), Error> {
            if self.fail_start {
                return Err(Error::Docker {
                    status: 500,
                    message: "cannot start container".to_string(),
                });
            }
            Ok(())
        }

        async fn logs(&self, _id: &str) -> Result<LogStream, Error> {
            if self.hang_logs {
                return Ok(stream::pending().boxed());
            }
            // deliver in small chunks so frames straddle chunk boundaries
            let chunks: Vec<std::io::Result<Bytes>> = self
                .log_bytes
                .chunks(5)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Ok(stream::iter(chunks).boxed())
        }

        async fn wait(&self, _id: &str) -> Result<i64, Error> {
            Ok(self.exit_code)
        }

        async fn stop(&self, id: &str) -> Result<(), Error> {
            if self.hang_stop {
                futures::future::pending::<()>().await;
            }
            self.state.lock().unwrap().stopped.push(id.to_string());
            Ok(())
        }

        async fn remove(&self, id: &str) -> Result<(), Error> {
            self.state.lock().unwrap().live.remove(id);
            Ok(())
        }
    }
}
