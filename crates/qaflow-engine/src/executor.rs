//! Execution of a single `act` request against a session provider.
//!
//! Element lookups poll the provider at a fixed interval until a deadline. Every
//! provider call and every pause between polls races the run's cancellation token,
//! so a cancelled run stops within one poll interval and reports `Cancelled`.

use crate::backend::{ElementHandle, SessionError, SessionProvider};
use qaflow_common::protocol::ActRequest;
use qaflow_common::report::ErrorKind;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Polling never runs tighter than this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Unknown locator: {0}")]
    UnknownLocator(String),

    #[error("Element {selector} not found within {timeout_ms}ms")]
    ElementNotFound { selector: String, timeout_ms: u64 },

    #[error("Interaction with {selector} failed: {reason}")]
    Interaction { selector: String, reason: String },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Capture to {path} failed: {reason}")]
    Capture { path: String, reason: String },

    #[error("Timed out after {timeout_ms}ms waiting for {selector}")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Session unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("TOTP code unavailable: {0}")]
    Totp(String),
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::UnknownLocator(_) => ErrorKind::UnknownLocator,
            StepError::ElementNotFound { .. } => ErrorKind::ElementNotFound,
            StepError::Interaction { .. } => ErrorKind::InteractionError,
            StepError::Navigation { .. } => ErrorKind::NavigationError,
            StepError::Capture { .. } => ErrorKind::CaptureError,
            StepError::Timeout { .. } => ErrorKind::Timeout,
            StepError::Cancelled => ErrorKind::Cancelled,
            StepError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            StepError::Totp(_) => ErrorKind::Totp,
        }
    }

    /// Eligible for an explicitly configured retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StepError::ElementNotFound { .. } | StepError::Interaction { .. }
        )
    }

    /// Ends the whole suite, not just the current case.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StepError::ProviderUnavailable(_))
    }

    /// Maps a provider failure, routing session loss to `ProviderUnavailable`.
    pub fn from_session(err: SessionError, otherwise: impl FnOnce(String) -> StepError) -> Self {
        if err.is_fatal() {
            StepError::ProviderUnavailable(err.to_string())
        } else {
            otherwise(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Lookup budget for `click` and `type`.
    pub element_timeout: Duration,
    /// Budget for `wait` requests without an explicit `timeMs`.
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            element_timeout: Duration::from_millis(3000),
            wait_timeout: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Races `fut` against cancellation. Cancellation wins ties.
pub async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, StepError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StepError::Cancelled),
        out = fut => Ok(out),
    }
}

#[derive(Debug, Clone)]
pub struct ActionExecutor {
    settings: ExecutorSettings,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new(ExecutorSettings::default())
    }
}

impl ActionExecutor {
    pub fn new(mut settings: ExecutorSettings) -> Self {
        settings.poll_interval = settings.poll_interval.max(MIN_POLL_INTERVAL);
        Self { settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub async fn execute<P: SessionProvider + ?Sized>(
        &self,
        provider: &mut P,
        request: &ActRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StepError> {
        match request {
            ActRequest::Click { selector } => {
                let element = self.locate(provider, selector, cancel).await?;
                cancellable(cancel, provider.click(&element))
                    .await?
                    .map_err(|e| interaction_failure(selector, e))
            }
            ActRequest::Type { selector, text } => {
                let element = self.locate(provider, selector, cancel).await?;
                if !provider.replaces_on_type() {
                    cancellable(cancel, provider.clear(&element))
                        .await?
                        .map_err(|e| interaction_failure(selector, e))?;
                }
                cancellable(cancel, provider.type_text(&element, text))
                    .await?
                    .map_err(|e| interaction_failure(selector, e))
            }
            ActRequest::Wait { selector, time_ms } => {
                let timeout = time_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.settings.wait_timeout);
                match self.poll_for(provider, selector, timeout, cancel).await? {
                    Some(_) => Ok(()),
                    None => Err(StepError::Timeout {
                        selector: selector.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                }
            }
        }
    }

    async fn locate<P: SessionProvider + ?Sized>(
        &self,
        provider: &mut P,
        selector: &str,
        cancel: &CancellationToken,
    ) -> Result<ElementHandle, StepError> {
        let timeout = self.settings.element_timeout;
        self.poll_for(provider, selector, timeout, cancel)
            .await?
            .ok_or_else(|| StepError::ElementNotFound {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
    }

    /// Polls until the element appears (`Some`) or `timeout` elapses (`None`).
    async fn poll_for<P: SessionProvider + ?Sized>(
        &self,
        provider: &mut P,
        selector: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<ElementHandle>, StepError> {
        let poll = self.settings.poll_interval;
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let mut budget = deadline.saturating_duration_since(Instant::now()).min(poll);
            if attempts == 1 {
                // A zero or nearly spent timeout still gets one real lookup.
                budget = budget.max(poll);
            }
            match cancellable(cancel, provider.find(selector, budget)).await? {
                Ok(handle) => {
                    debug!(selector, attempts, "Element located");
                    return Ok(Some(handle));
                }
                Err(SessionError::ElementNotFound { .. }) | Err(SessionError::Timeout { .. }) => {}
                Err(e) => return Err(interaction_failure(selector, e)),
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(selector, attempts, "Element lookup deadline reached");
                return Ok(None);
            }
            let pause = poll.min(deadline - now);
            cancellable(cancel, tokio::time::sleep(pause)).await?;
        }
    }
}

fn interaction_failure(selector: &str, err: SessionError) -> StepError {
    StepError::from_session(err, |reason| StepError::Interaction {
        selector: selector.to_string(),
        reason,
    })
}
