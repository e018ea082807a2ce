//! The shared Python interpreter process.
//!
//! One interpreter serves every Python invocation of the process. It is
//! started on first use, and all work on it goes through an async mutex that
//! acts as the execution queue: a run or an install owns the process until
//! it has read the final response.

use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::protocol::{ErrorCategory, Request, Response};
use crate::config::PythonConfig;
use crate::context::{ExecutionContext, HostFunction};
use crate::error::{RuntimeError, SandboxError};
use crate::runtime::{MessageSink, render_message};

const BRIDGE: &str = include_str!("bridge.py");

static SHARED: OnceLock<Arc<PythonInterpreter>> = OnceLock::new();

/// Handle to the interpreter process, spawned lazily.
#[derive(Debug)]
pub struct PythonInterpreter {
    config: PythonConfig,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    process: Option<InterpreterProcess>,
    /// Modules known to be importable. Installs persist in the
    /// interpreter's environment, so the set outlives respawns.
    installed: HashSet<String>,
}

impl PythonInterpreter {
    /// Create an interpreter handle. No process is started until the first
    /// call.
    pub fn new(config: PythonConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// The process-wide interpreter.
    ///
    /// The first caller's configuration is used; later calls get the same
    /// instance whatever they pass.
    pub fn shared(config: &PythonConfig) -> Arc<Self> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::new(config.clone()))))
    }

    /// Configuration the interpreter was created with.
    pub fn config(&self) -> &PythonConfig {
        &self.config
    }

    /// Interpreter version reported at startup, starting it if needed.
    pub async fn version(&self) -> Result<String, SandboxError> {
        let mut state = self.state.lock().await;
        let process = self.process(&mut state).await?;
        Ok(process.version.clone())
    }

    /// Make `modules` importable.
    ///
    /// Names installed earlier are skipped without contacting the
    /// interpreter.
    pub async fn install(&self, modules: &[String]) -> Result<(), SandboxError> {
        let mut guard = self.state.lock().await;
        let missing: Vec<String> = modules
            .iter()
            .filter(|name| !guard.installed.contains(*name))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        tracing::debug!(modules = ?missing, "installing python modules");
        let process = self.process(&mut guard).await?;
        let outcome = process.install(&missing, &self.config.install_args).await;
        discard_on_failure(&mut guard, &outcome);
        outcome?;

        guard.installed.extend(missing);
        Ok(())
    }

    /// Run wrapped `source` with the context's symbols as globals.
    pub async fn run(
        &self,
        source: &str,
        context: &ExecutionContext,
        sink: Option<&Arc<dyn MessageSink>>,
    ) -> Result<Option<Value>, SandboxError> {
        let globals = context.bindings();
        let functions = context.functions();
        let request = Request::Run {
            source,
            globals: &globals,
            interactive: sink.is_some(),
        };

        let mut guard = self.state.lock().await;
        let process = self.process(&mut guard).await?;
        let outcome = process.run(&request, &functions, sink).await;
        discard_on_failure(&mut guard, &outcome);
        outcome
    }

    /// A live process, spawning one when there is none or the previous one
    /// exited or was abandoned mid-request.
    async fn process<'s>(
        &self,
        state: &'s mut State,
    ) -> Result<&'s mut InterpreterProcess, SandboxError> {
        if let Some(process) = state.process.as_mut() {
            if process.in_flight {
                tracing::warn!("python interpreter was abandoned mid-request, restarting");
                state.process = None;
            } else if let Ok(Some(status)) = process.child.try_wait() {
                tracing::warn!(%status, "python interpreter exited, restarting");
                state.process = None;
            }
        }
        if state.process.is_none() {
            state.process = Some(InterpreterProcess::spawn(&self.config).await?);
        }
        state
            .process
            .as_mut()
            .ok_or_else(|| SandboxError::interpreter("python interpreter unavailable"))
    }
}

/// Drop the process after an infrastructure failure so the next call starts
/// a new one.
fn discard_on_failure<T>(state: &mut State, outcome: &Result<T, SandboxError>) {
    if let Err(error @ SandboxError::Interpreter { .. }) = outcome {
        tracing::warn!(%error, "discarding python interpreter");
        state.process = None;
    }
}

/// Whether `executable` can be started.
pub fn python_available(executable: &Path) -> bool {
    std::process::Command::new(executable)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

#[derive(Debug)]
struct InterpreterProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    version: String,
    in_flight: bool,
}

impl InterpreterProcess {
    async fn spawn(config: &PythonConfig) -> Result<Self, SandboxError> {
        let mut child = Command::new(&config.executable)
            .arg("-u")
            .arg("-c")
            .arg(BRIDGE)
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PIP_DISABLE_PIP_VERSION_CHECK", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| {
                SandboxError::interpreter(format!(
                    "failed to start `{}`: {error}",
                    config.executable.display()
                ))
            })?;

        let missing = || SandboxError::interpreter("interpreter pipes were not captured");
        let stdin = child.stdin.take().ok_or_else(missing)?;
        let stdout = child.stdout.take().ok_or_else(missing)?;
        let stderr = child.stderr.take().ok_or_else(missing)?;
        tokio::spawn(forward_stderr(stderr));

        let mut process = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            version: String::new(),
            in_flight: false,
        };
        match process.receive().await? {
            Response::Ready { version } => {
                tracing::info!(%version, executable = %config.executable.display(), "python interpreter ready");
                process.version = version;
                Ok(process)
            }
            other => Err(SandboxError::interpreter(format!(
                "unexpected startup message: {other:?}"
            ))),
        }
    }

    async fn run(
        &mut self,
        request: &Request<'_>,
        functions: &IndexMap<String, HostFunction>,
        sink: Option<&Arc<dyn MessageSink>>,
    ) -> Result<Option<Value>, SandboxError> {
        self.in_flight = true;
        self.send(request).await?;
        loop {
            match self.receive().await? {
                Response::Result { value } => {
                    self.in_flight = false;
                    return Ok(value);
                }
                Response::Error {
                    kind,
                    message,
                    category,
                } => {
                    self.in_flight = false;
                    return Err(match category {
                        ErrorCategory::Conversion => SandboxError::Conversion { message },
                        ErrorCategory::Execution => RuntimeError::new(kind, message).trimmed().into(),
                    });
                }
                Response::Call { function, args } => {
                    let outcome = match functions.get(&function) {
                        Some(host) => host.call(&args),
                        None => Err(format!("unknown host function `{function}`")),
                    };
                    self.send(&Request::reply(outcome)).await?;
                }
                Response::Print { args } => match sink {
                    Some(sink) => sink.send_message(args),
                    None => tracing::trace!(
                        target: "codenode::python",
                        text = %render_message(&args),
                        "print"
                    ),
                },
                other => {
                    return Err(SandboxError::interpreter(format!(
                        "unexpected message during run: {other:?}"
                    )));
                }
            }
        }
    }

    async fn install(&mut self, modules: &[String], args: &[String]) -> Result<(), SandboxError> {
        self.in_flight = true;
        self.send(&Request::Install { modules, args }).await?;
        let response = self.receive().await?;
        self.in_flight = false;
        match response {
            Response::Installed { installed } => {
                if !installed.is_empty() {
                    tracing::info!(modules = ?installed, "installed python modules");
                }
                Ok(())
            }
            Response::InstallError { module, message } => {
                Err(SandboxError::DependencyInstall { module, message })
            }
            other => Err(SandboxError::interpreter(format!(
                "unexpected message during install: {other:?}"
            ))),
        }
    }

    async fn send(&mut self, request: &Request<'_>) -> Result<(), SandboxError> {
        let mut line = serde_json::to_string(request).map_err(|error| SandboxError::Conversion {
            message: error.to_string(),
        })?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|error| SandboxError::interpreter(format!("write to interpreter failed: {error}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|error| SandboxError::interpreter(format!("write to interpreter failed: {error}")))
    }

    async fn receive(&mut self) -> Result<Response, SandboxError> {
        match self.stdout.next_line().await {
            Ok(Some(line)) => serde_json::from_str(&line).map_err(|error| {
                SandboxError::interpreter(format!("malformed interpreter message: {error}"))
            }),
            Ok(None) => Err(SandboxError::interpreter("interpreter exited")),
            Err(error) => Err(SandboxError::interpreter(format!(
                "read from interpreter failed: {error}"
            ))),
        }
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "codenode::python", "{line}");
    }
}
