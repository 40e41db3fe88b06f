//! Case runner: executes one test case's steps in order against one session.
//!
//! Run lifecycle is `Pending → Running → {Completed, Aborted}`. Every step error is
//! caught here and recorded against its index; nothing escapes `run`.

use crate::backend::SessionProvider;
use crate::executor::{ActionExecutor, ExecutorSettings, StepError, cancellable};
use crate::totp::{SystemTotp, TotpProvider};
use qaflow_common::formatter::describe_resolved_step;
use qaflow_common::locator::{LocatorError, LocatorMap};
use qaflow_common::protocol::{ActRequest, StepDescriptor, TestCase};
use qaflow_common::report::{ErrorInfo, RunRecorder, RunReport, RunState, StepRecord, StepStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// First failure aborts the run; remaining steps are skipped.
    #[default]
    StopOnFailure,
    /// Failures are recorded and execution carries on.
    ContinueOnFailure,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop-on-failure" | "stop" => Ok(FailurePolicy::StopOnFailure),
            "continue-on-failure" | "continue" => Ok(FailurePolicy::ContinueOnFailure),
            other => Err(format!("unknown failure policy: {}", other)),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::StopOnFailure => f.write_str("stop-on-failure"),
            FailurePolicy::ContinueOnFailure => f.write_str("continue-on-failure"),
        }
    }
}

/// Explicit retry of flaky `act` steps. One attempt means no retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            delay: Duration::from_millis(500),
        }
    }
}

pub const DEFAULT_TOTP_PLACEHOLDER: &str = "验证码";

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub policy: FailurePolicy,
    pub retry: RetryPolicy,
    pub executor: ExecutorSettings,
    pub navigation_timeout: Duration,
    /// Base for relative `open` targets.
    pub base_url: Option<Url>,
    /// Typed text that is swapped for a fresh TOTP code.
    pub totp_placeholder: String,
    pub totp_secret: Option<String>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::default(),
            retry: RetryPolicy::default(),
            executor: ExecutorSettings::default(),
            navigation_timeout: Duration::from_millis(5000),
            base_url: None,
            totp_placeholder: DEFAULT_TOTP_PLACEHOLDER.to_string(),
            totp_secret: None,
        }
    }
}

/// Stateless between runs; clone freely and share across concurrent cases.
#[derive(Clone)]
pub struct CaseRunner {
    settings: RunSettings,
    executor: ActionExecutor,
    locators: Arc<LocatorMap>,
    totp: Arc<dyn TotpProvider>,
}

struct StepOutcome {
    result: Result<(), StepError>,
    attempts: u32,
}

impl CaseRunner {
    pub fn new(settings: RunSettings, locators: Arc<LocatorMap>) -> Self {
        Self {
            executor: ActionExecutor::new(settings.executor.clone()),
            settings,
            locators,
            totp: Arc::new(SystemTotp),
        }
    }

    pub fn with_totp(mut self, totp: Arc<dyn TotpProvider>) -> Self {
        self.totp = totp;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn locators(&self) -> &LocatorMap {
        &self.locators
    }

    pub async fn run<P: SessionProvider + ?Sized>(
        &self,
        provider: &mut P,
        case: &TestCase,
        cancel: &CancellationToken,
    ) -> RunReport {
        let started = Instant::now();
        let mut recorder = RunRecorder::new(case.name.clone());
        recorder.start();
        info!(
            case = %case.name,
            steps = case.len(),
            policy = %self.settings.policy,
            "Running case"
        );

        let mut state = RunState::Completed;
        let mut steps = case.steps.iter().enumerate();

        for (index, step) in steps.by_ref() {
            let description = describe_resolved_step(step, &self.locators);
            let step_started = Instant::now();

            let outcome = if cancel.is_cancelled() {
                StepOutcome {
                    result: Err(StepError::Cancelled),
                    attempts: 0,
                }
            } else {
                info!(case = %case.name, step = index, "{}", description);
                self.execute_step(provider, step, cancel, &mut recorder)
                    .await
            };
            let duration_ms = step_started.elapsed().as_millis() as u64;

            match outcome.result {
                Ok(()) => recorder.record(StepRecord {
                    step_index: index,
                    action: step.label(),
                    description,
                    status: StepStatus::Pass,
                    error: None,
                    duration_ms,
                    attempts: outcome.attempts,
                }),
                Err(err) => {
                    warn!(case = %case.name, step = index, kind = %err.kind(), "{}", err);
                    let fatal = err.is_fatal();
                    let cancelled = matches!(err, StepError::Cancelled);
                    // Capture errors are recorded but do not fail a continue-on-failure run.
                    let tolerated = matches!(err, StepError::Capture { .. })
                        && self.settings.policy == FailurePolicy::ContinueOnFailure;
                    recorder.record(StepRecord {
                        step_index: index,
                        action: step.label(),
                        description,
                        status: if tolerated {
                            StepStatus::Pass
                        } else {
                            StepStatus::Fail
                        },
                        error: Some(ErrorInfo {
                            kind: err.kind(),
                            message: err.to_string(),
                            step_index: index,
                        }),
                        duration_ms,
                        attempts: outcome.attempts,
                    });

                    if fatal {
                        recorder.mark_fatal();
                    }
                    if fatal || cancelled || self.settings.policy == FailurePolicy::StopOnFailure
                    {
                        state = RunState::Aborted;
                        break;
                    }
                }
            }
        }

        for (index, step) in steps {
            recorder.record(StepRecord::skipped(
                index,
                step.label(),
                describe_resolved_step(step, &self.locators),
            ));
        }

        let report = recorder.finish(state, started.elapsed());
        info!(
            case = %report.case_name(),
            state = ?report.state(),
            passed = report.count(StepStatus::Pass),
            failed = report.count(StepStatus::Fail),
            skipped = report.count(StepStatus::Skipped),
            duration_ms = report.duration_ms(),
            "Case finished"
        );
        report
    }

    async fn execute_step<P: SessionProvider + ?Sized>(
        &self,
        provider: &mut P,
        step: &StepDescriptor,
        cancel: &CancellationToken,
        recorder: &mut RunRecorder,
    ) -> StepOutcome {
        match step {
            StepDescriptor::Open { target_url } => StepOutcome {
                result: self.open(provider, target_url, cancel).await,
                attempts: 1,
            },
            StepDescriptor::Act { request } => self.act(provider, request, cancel).await,
            StepDescriptor::Screenshot { path } => {
                let result = self.capture(provider, path, cancel).await;
                if result.is_ok() {
                    recorder.add_artifact(Path::new(path));
                }
                StepOutcome {
                    result,
                    attempts: 1,
                }
            }
        }
    }

    async fn open<P: SessionProvider + ?Sized>(
        &self,
        provider: &mut P,
        target_url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StepError> {
        let url = self.resolve_url(target_url)?;
        let limit = self.settings.navigation_timeout;
        let navigation = tokio::time::timeout(limit, provider.navigate(url.as_str()));

        match cancellable(cancel, navigation).await? {
            Ok(Ok(result)) => {
                info!(url = %result.url, title = %result.title, "Navigated");
                Ok(())
            }
            Ok(Err(e)) => Err(StepError::from_session(e, |reason| {
                StepError::Navigation {
                    url: url.to_string(),
                    reason,
                }
            })),
            Err(_) => Err(StepError::Navigation {
                url: url.to_string(),
                reason: format!("no response within {}ms", limit.as_millis()),
            }),
        }
    }

    async fn act<P: SessionProvider + ?Sized>(
        &self,
        provider: &mut P,
        request: &ActRequest,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let resolved = match self.locators.expand(request.selector()) {
            Ok(selector) => request.with_selector(selector),
            Err(e) => {
                let key = match e {
                    LocatorError::UnknownLocator(key) => key,
                    other => other.to_string(),
                };
                return StepOutcome {
                    result: Err(StepError::UnknownLocator(key)),
                    attempts: 0,
                };
            }
        };

        let max_attempts = self.settings.retry.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self.with_totp_code(&resolved) {
                Ok(request) => self.executor.execute(provider, &request, cancel).await,
                Err(e) => Err(e),
            };

            match result {
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        "Retrying {} after: {}",
                        request.kind_name(),
                        err
                    );
                    if let Err(cancelled) =
                        cancellable(cancel, tokio::time::sleep(self.settings.retry.delay)).await
                    {
                        return StepOutcome {
                            result: Err(cancelled),
                            attempts: attempt,
                        };
                    }
                }
                result => {
                    return StepOutcome {
                        result,
                        attempts: attempt,
                    };
                }
            }
        }
    }

    async fn capture<P: SessionProvider + ?Sized>(
        &self,
        provider: &mut P,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StepError> {
        cancellable(cancel, provider.capture(Path::new(path)))
            .await?
            .map_err(|e| {
                StepError::from_session(e, |reason| StepError::Capture {
                    path: path.to_string(),
                    reason,
                })
            })
    }

    /// Absolute targets pass through; relative ones join the configured base URL.
    pub fn resolve_url(&self, target: &str) -> Result<Url, StepError> {
        match Url::parse(target) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.settings.base_url {
                Some(base) => base.join(target).map_err(|e| StepError::Navigation {
                    url: target.to_string(),
                    reason: e.to_string(),
                }),
                None => Err(StepError::Navigation {
                    url: target.to_string(),
                    reason: "relative URL with no base URL configured".into(),
                }),
            },
            Err(e) => Err(StepError::Navigation {
                url: target.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Swaps the TOTP placeholder for a freshly generated code.
    fn with_totp_code(&self, request: &ActRequest) -> Result<ActRequest, StepError> {
        match request {
            ActRequest::Type { selector, text } if *text == self.settings.totp_placeholder => {
                let secret = self
                    .settings
                    .totp_secret
                    .as_deref()
                    .ok_or_else(|| StepError::Totp("no TOTP secret configured".into()))?;
                let code = self
                    .totp
                    .code(secret)
                    .map_err(|e| StepError::Totp(e.to_string()))?;
                Ok(ActRequest::Type {
                    selector: selector.clone(),
                    text: code,
                })
            }
            other => Ok(other.clone()),
        }
    }
}
