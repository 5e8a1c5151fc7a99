//! Execution backends.
//!
//! A backend turns (description, worker role) into the worker's output. Two
//! implementations sit behind the [`Dispatcher`] trait: [`CommandBackend`]
//! runs a configured local program (the simple path) and [`HeadlessBackend`]
//! runs an LLM CLI in headless JSON mode (the advanced path).
//! [`BackendSelector`] picks one per task and falls back from advanced to
//! simple when the advanced path errors.

use crate::error::{Error, Result};
use crate::routing::mode::{ExecutionMode, ModeSelector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default timeout for one headless run (10 minutes).
pub const DEFAULT_HEADLESS_TIMEOUT_SECS: u64 = 600;

/// Binary looked up on `PATH` when none is configured.
pub const DEFAULT_HEADLESS_BINARY: &str = "claude";

/// Environment variable carrying the worker role to the simple backend.
pub const WORKER_ENV: &str = "SWITCHYARD_WORKER";

/// Failure of one dispatch call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The call ran and failed; worth retrying.
    #[error("dispatch failed: {0}")]
    Failed(String),

    /// The backend cannot be reached at all.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl DispatchError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DispatchError::Unavailable(_))
    }
}

/// The dispatch boundary. Output is opaque to the coordinator.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, description: &str, worker_role: &str) -> std::result::Result<String, DispatchError>;

    fn name(&self) -> &str;
}

/// Prompt handed to a backend for one task.
pub fn render_prompt(worker_role: &str, description: &str) -> String {
    format!("[{}] {}", worker_role, description)
}

fn spawn_error(program: &str, e: std::io::Error) -> DispatchError {
    DispatchError::Unavailable(format!("cannot run '{}': {}", program, e))
}

/// Runs `program args... <prompt>` and returns trimmed stdout.
///
/// The worker role is also exported as `SWITCHYARD_WORKER`.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Dispatcher for CommandBackend {
    async fn dispatch(&self, description: &str, worker_role: &str) -> std::result::Result<String, DispatchError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(render_prompt(worker_role, description))
            .env(WORKER_ENV, worker_role)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error(&self.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!(
                    "{} exited with code {}",
                    self.program,
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Err(DispatchError::Failed(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Outcome reported by a headless run.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessResult {
    Success { output: String },
    Error { message: String },
}

/// Parsed headless response.
#[derive(Debug, Clone)]
pub struct HeadlessResponse {
    pub session_id: Option<String>,
    pub result: HeadlessResult,
    pub cost_usd: Option<f64>,
    pub num_turns: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawHeadlessResponse {
    subtype: Option<String>,
    result: Option<String>,
    session_id: Option<String>,
    total_cost_usd: Option<f64>,
    num_turns: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

/// LLM CLI run non-interactively (`-p <prompt> --output-format json`).
#[derive(Debug, Clone)]
pub struct HeadlessBackend {
    binary: PathBuf,
    timeout: Duration,
}

impl HeadlessBackend {
    /// Find the binary on `PATH` (or check the given path).
    ///
    /// # Errors
    /// [`Error::BackendNotFound`] if it cannot be located.
    pub fn locate(binary: Option<&str>) -> Result<Self> {
        let name = binary.unwrap_or(DEFAULT_HEADLESS_BINARY);
        let binary = which::which(name).map_err(|_| Error::BackendNotFound(name.to_string()))?;
        debug!(binary = %binary.display(), "located headless backend");
        Ok(Self::with_binary(binary))
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            timeout: Duration::from_secs(DEFAULT_HEADLESS_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn parse_response(json: &str) -> Result<HeadlessResponse> {
        let raw: RawHeadlessResponse = serde_json::from_str(json)?;

        let result = match raw.subtype.as_deref() {
            Some("success") => HeadlessResult::Success {
                output: raw.result.unwrap_or_default(),
            },
            Some("error") => HeadlessResult::Error {
                message: raw.error.or(raw.result).unwrap_or_default(),
            },
            _ => match (raw.error, raw.result) {
                (Some(message), _) => HeadlessResult::Error { message },
                (None, Some(output)) => HeadlessResult::Success { output },
                (None, None) => HeadlessResult::Error {
                    message: "Unknown response format".to_string(),
                },
            },
        };

        Ok(HeadlessResponse {
            session_id: raw.session_id,
            result,
            cost_usd: raw.total_cost_usd,
            num_turns: raw.num_turns,
        })
    }
}

#[async_trait]
impl Dispatcher for HeadlessBackend {
    async fn dispatch(&self, description: &str, worker_role: &str) -> std::result::Result<String, DispatchError> {
        let prompt = render_prompt(worker_role, description);
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary)
                .arg("-p")
                .arg(&prompt)
                .arg("--output-format")
                .arg("json")
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| DispatchError::Failed(format!("headless run timed out after {:?}", self.timeout)))?
        .map_err(|e| spawn_error(&self.binary.to_string_lossy(), e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Ok(response) = Self::parse_response(&stdout) {
            debug!(
                worker = worker_role,
                session_id = ?response.session_id,
                cost_usd = ?response.cost_usd,
                turns = ?response.num_turns,
                "headless run finished"
            );
            return match response.result {
                HeadlessResult::Success { output } => Ok(output),
                HeadlessResult::Error { message } => Err(DispatchError::Failed(message)),
            };
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!(
                    "headless run failed with exit code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Err(DispatchError::Failed(message));
        }

        Ok(stdout.trim().to_string())
    }

    fn name(&self) -> &str {
        "headless"
    }
}

/// Which backend served a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Simple,
    Advanced,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Simple => write!(f, "simple"),
            BackendKind::Advanced => write!(f, "advanced"),
        }
    }
}

/// Result of one dispatch through the selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub result: std::result::Result<String, DispatchError>,
    pub backend: BackendKind,
}

/// Chooses a backend per task.
///
/// Without an advanced backend every task goes to the simple one.
#[derive(Clone)]
pub struct BackendSelector {
    simple: Arc<dyn Dispatcher>,
    advanced: Option<(Arc<dyn Dispatcher>, ModeSelector)>,
}

impl fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSelector")
            .field("simple", &self.simple.name())
            .field("advanced", &self.advanced.as_ref().map(|(d, _)| d.name()))
            .finish()
    }
}

impl BackendSelector {
    pub fn new(simple: Arc<dyn Dispatcher>) -> Self {
        Self {
            simple,
            advanced: None,
        }
    }

    pub fn with_advanced(mut self, advanced: Arc<dyn Dispatcher>, modes: ModeSelector) -> Self {
        self.advanced = Some((advanced, modes));
        self
    }

    pub fn has_advanced(&self) -> bool {
        self.advanced.is_some()
    }

    /// Backend a description would be sent to first.
    pub fn select(&self, description: &str) -> BackendKind {
        match &self.advanced {
            Some((_, modes)) if modes.select(description) == ExecutionMode::Advanced => {
                BackendKind::Advanced
            }
            _ => BackendKind::Simple,
        }
    }

    /// Dispatch one attempt; an advanced failure of either kind is retried
    /// once on the simple backend within the same attempt.
    pub async fn dispatch(&self, description: &str, worker_role: &str) -> Served {
        if let (BackendKind::Advanced, Some((advanced, _))) = (self.select(description), &self.advanced) {
            match advanced.dispatch(description, worker_role).await {
                Ok(output) => {
                    return Served {
                        result: Ok(output),
                        backend: BackendKind::Advanced,
                    }
                }
                Err(e) => {
                    warn!(
                        worker = worker_role,
                        backend = advanced.name(),
                        error = %e,
                        "advanced backend failed, falling back to simple"
                    );
                }
            }
        }

        Served {
            result: self.simple.dispatch(description, worker_role).await,
            backend: BackendKind::Simple,
        }
    }
}
