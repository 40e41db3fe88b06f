//! Running many cases: sequentially on one session, or concurrently with one
//! session per case.

use crate::backend::{SessionError, SessionProvider};
use crate::runner::CaseRunner;
use async_trait::async_trait;
use qaflow_common::protocol::TestCase;
use qaflow_common::report::{RunReport, SuiteReport};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A case paired with the runner configured for its suite.
#[derive(Clone)]
pub struct PlannedCase {
    pub runner: CaseRunner,
    pub case: TestCase,
}

/// Creates independent, launched sessions for parallel runs.
#[async_trait]
pub trait ProviderFactory: Send + Sync + 'static {
    async fn create(&self) -> Result<Box<dyn SessionProvider>, SessionError>;
}

/// Runs cases in order on one session, so later cases see the state earlier ones left.
///
/// A fatal provider failure or cancellation leaves the remaining cases unrun.
pub async fn run_sequential<P: SessionProvider + ?Sized>(
    provider: &mut P,
    plan: &[PlannedCase],
    cancel: &CancellationToken,
) -> SuiteReport {
    let mut suite = SuiteReport::default();
    let mut pending = plan.iter();

    for planned in pending.by_ref() {
        if cancel.is_cancelled() {
            suite.not_run.push(planned.case.name.clone());
            break;
        }

        let report = planned.runner.run(provider, &planned.case, cancel).await;
        let fatal = report.is_fatal();
        if fatal {
            error!(case = %report.case_name(), "Session lost; stopping suite");
            suite.fatal_error = report.first_error().map(|e| e.message.clone());
        }
        suite.cases.push(report);
        if fatal {
            break;
        }
    }

    suite
        .not_run
        .extend(pending.map(|planned| planned.case.name.clone()));
    suite
}

enum CaseOutcome {
    Ran(Box<RunReport>),
    NotRun,
    LaunchFailed(String),
}

/// Runs cases concurrently, each on its own session from `factory`.
///
/// Reports come back in plan order. A session that fails to launch, or a fatal
/// failure inside any case, stops cases that have not started yet.
pub async fn run_parallel<F: ProviderFactory>(
    factory: Arc<F>,
    plan: Vec<PlannedCase>,
    max_concurrency: usize,
    cancel: &CancellationToken,
) -> SuiteReport {
    let names: Vec<String> = plan.iter().map(|p| p.case.name.clone()).collect();
    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let halt = cancel.child_token();
    let mut tasks = JoinSet::new();

    for (index, planned) in plan.into_iter().enumerate() {
        let factory = Arc::clone(&factory);
        let permits = Arc::clone(&permits);
        let halt = halt.clone();

        tasks.spawn(async move {
            let outcome = run_isolated(factory.as_ref(), planned, &permits, &halt).await;
            (index, outcome)
        });
    }

    let mut outcomes: Vec<Option<CaseOutcome>> = names.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(e) => error!("Case task failed: {}", e),
        }
    }

    let mut suite = SuiteReport::default();
    for (name, outcome) in names.into_iter().zip(outcomes) {
        match outcome {
            Some(CaseOutcome::Ran(report)) => {
                if report.is_fatal() && suite.fatal_error.is_none() {
                    suite.fatal_error = report.first_error().map(|e| e.message.clone());
                }
                suite.cases.push(*report);
            }
            Some(CaseOutcome::LaunchFailed(message)) => {
                if suite.fatal_error.is_none() {
                    suite.fatal_error = Some(message);
                }
                suite.not_run.push(name);
            }
            Some(CaseOutcome::NotRun) | None => suite.not_run.push(name),
        }
    }
    suite
}

async fn run_isolated<F: ProviderFactory>(
    factory: &F,
    planned: PlannedCase,
    permits: &Semaphore,
    halt: &CancellationToken,
) -> CaseOutcome {
    let _permit = tokio::select! {
        biased;
        _ = halt.cancelled() => return CaseOutcome::NotRun,
        permit = permits.acquire() => match permit {
            Ok(permit) => permit,
            Err(_) => return CaseOutcome::NotRun,
        },
    };
    if halt.is_cancelled() {
        return CaseOutcome::NotRun;
    }

    let mut provider = match factory.create().await {
        Ok(provider) => provider,
        Err(e) => {
            error!(case = %planned.case.name, "Failed to launch session: {}", e);
            halt.cancel();
            return CaseOutcome::LaunchFailed(e.to_string());
        }
    };

    info!(case = %planned.case.name, "Session launched");
    let report = planned.runner.run(&mut *provider, &planned.case, halt).await;
    if report.is_fatal() {
        halt.cancel();
    }
    if let Err(e) = provider.close().await {
        warn!(case = %planned.case.name, "Failed to close session: {}", e);
    }
    CaseOutcome::Ran(Box::new(report))
}
