//! Run reports produced by case execution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownLocator,
    ElementNotFound,
    InteractionError,
    NavigationError,
    CaptureError,
    Timeout,
    Cancelled,
    /// The session provider is gone; aborts the whole suite.
    ProviderUnavailable,
    Totp,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownLocator => "UnknownLocator",
            ErrorKind::ElementNotFound => "ElementNotFound",
            ErrorKind::InteractionError => "InteractionError",
            ErrorKind::NavigationError => "NavigationError",
            ErrorKind::CaptureError => "CaptureError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::Totp => "Totp",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub step_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_index: usize,
    /// e.g. `open`, `act:click`
    pub action: String,
    /// Human-readable step summary with sensitive text masked.
    pub description: String,
    pub status: StepStatus,
    /// Set on every `Fail`; also on a `Pass` screenshot step whose capture error was tolerated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub duration_ms: u64,
    /// Number of attempts made; 0 for skipped steps.
    pub attempts: u32,
}

impl StepRecord {
    pub fn skipped(step_index: usize, action: String, description: String) -> Self {
        Self {
            step_index,
            action,
            description,
            status: StepStatus::Skipped,
            error: None,
            duration_ms: 0,
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }
}

/// Finalized outcome of one case execution. Only [`RunRecorder::finish`] builds one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    case_name: String,
    state: RunState,
    steps: Vec<StepRecord>,
    artifacts: Vec<PathBuf>,
    duration_ms: u64,
    #[serde(default)]
    fatal: bool,
}

impl RunReport {
    pub fn case_name(&self) -> &str {
        &self.case_name
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// A provider-level failure ended this case.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorInfo> {
        self.steps.iter().filter_map(|s| s.error.as_ref())
    }

    pub fn first_error(&self) -> Option<&ErrorInfo> {
        self.errors().next()
    }

    /// Completed with no failed step.
    pub fn passed(&self) -> bool {
        self.state == RunState::Completed && self.count(StepStatus::Fail) == 0
    }
}

/// Mutable builder owned by the case runner for the duration of one run.
#[derive(Debug)]
pub struct RunRecorder {
    case_name: String,
    state: RunState,
    steps: Vec<StepRecord>,
    artifacts: Vec<PathBuf>,
    fatal: bool,
}

impl RunRecorder {
    pub fn new(case_name: impl Into<String>) -> Self {
        Self {
            case_name: case_name.into(),
            state: RunState::Pending,
            steps: Vec::new(),
            artifacts: Vec::new(),
            fatal: false,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Pending → Running.
    pub fn start(&mut self) {
        debug_assert_eq!(self.state, RunState::Pending);
        self.state = RunState::Running;
    }

    pub fn record(&mut self, step: StepRecord) {
        debug_assert_eq!(step.step_index, self.steps.len());
        self.steps.push(step);
    }

    pub fn add_artifact(&mut self, path: &Path) {
        self.artifacts.push(path.to_path_buf());
    }

    pub fn mark_fatal(&mut self) {
        self.fatal = true;
    }

    /// Running → terminal. Consumes the recorder so a run is finalized exactly once.
    pub fn finish(self, state: RunState, elapsed: Duration) -> RunReport {
        debug_assert!(state.is_terminal());
        RunReport {
            case_name: self.case_name,
            state,
            steps: self.steps,
            artifacts: self.artifacts,
            duration_ms: elapsed.as_millis() as u64,
            fatal: self.fatal,
        }
    }
}

/// Aggregate over all cases of a suite invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub cases: Vec<RunReport>,
    /// Cases never started because a fatal provider failure stopped the suite.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_run: Vec<String>,
    /// Provider failure that stopped the suite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
}

impl SuiteReport {
    pub fn aborted_by_fatal(&self) -> bool {
        self.fatal_error.is_some() || self.cases.iter().any(RunReport::is_fatal)
    }

    pub fn passed(&self) -> bool {
        self.fatal_error.is_none()
            && self.not_run.is_empty()
            && self.cases.iter().all(RunReport::passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() { 0 } else { 1 }
    }
}
