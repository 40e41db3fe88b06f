//! Shared plumbing for front ends: loading suites, planning runs, and emitting reports.

use crate::config::{ConfigError, ConfigLoader, QaflowConfig, SettingsError};
use crate::runner::{CaseRunner, FailurePolicy};
use crate::suite::{PlannedCase, ReferenceIssue, SuiteError, SuiteFile, SuiteLoader, check_references};
use qaflow_common::formatter::format_suite_report;
use qaflow_common::locator::LocatorMap;
use qaflow_common::report::SuiteReport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const REPORT_FILE_NAME: &str = "report.json";

#[derive(Clone, Copy)]
pub struct OutputHandlers {
    pub out: fn(&str),
    pub err: fn(&str),
}

/// Command-line overrides applied on top of suite manifests and configuration.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Wins over both the manifest and the configured policy.
    pub policy: Option<FailurePolicy>,
    /// Used when a suite file does not name its portal.
    pub portal: Option<String>,
}

/// Expands `patterns` and loads every matching suite file.
pub async fn load_suites(patterns: &[String]) -> Result<Vec<SuiteFile>, SuiteError> {
    let paths = SuiteLoader::expand_patterns(patterns)?;
    let mut suites = Vec::with_capacity(paths.len());
    for path in paths {
        let suite = SuiteLoader::load(&path).await?;
        info!(path = %path.display(), cases = suite.cases.len(), "Loaded suite");
        suites.push(suite);
    }
    Ok(suites)
}

/// Loads the locator registry named on the command line, else the configured one.
///
/// No registry at all yields an empty map; `@key` references then fail at dispatch.
pub async fn load_locators(
    config: &QaflowConfig,
    override_path: Option<&Path>,
) -> Result<LocatorMap, ConfigError> {
    match override_path.or(config.locators.as_deref()) {
        Some(path) => {
            let locators = ConfigLoader::load_locators(path).await?;
            info!(path = %path.display(), entries = locators.len(), "Loaded locators");
            Ok(locators)
        }
        None => Ok(LocatorMap::new()),
    }
}

/// Pairs every case with a runner configured for its suite's portal and policy.
pub fn build_plan(
    config: &QaflowConfig,
    locators: Arc<LocatorMap>,
    suites: &[SuiteFile],
    options: &PlanOptions,
) -> Result<Vec<PlannedCase>, SettingsError> {
    let mut plan = Vec::new();
    for suite in suites {
        let portal = suite.portal.as_deref().or(options.portal.as_deref());
        let policy = options.policy.or(suite.policy);
        let settings = config.run_settings(portal, policy)?;
        let runner = CaseRunner::new(settings, Arc::clone(&locators));

        plan.extend(suite.cases.iter().map(|case| PlannedCase {
            runner: runner.clone(),
            case: case.clone(),
        }));
    }
    Ok(plan)
}

/// Reports every unresolvable `@key` across `suites`.
pub fn check_suites(
    suites: &[SuiteFile],
    locators: &LocatorMap,
    output: OutputHandlers,
) -> Vec<ReferenceIssue> {
    let mut issues = Vec::new();
    for suite in suites {
        let found = check_references(suite, locators);
        for issue in &found {
            (output.err)(&format!("{}: {}", suite.path.display(), issue));
        }
        issues.extend(found);
    }
    let total: usize = suites.iter().map(|s| s.cases.len()).sum();
    (output.out)(&format!(
        "{} suite(s), {} case(s), {} unresolved locator(s)",
        suites.len(),
        total,
        issues.len()
    ));
    issues
}

/// A token that is cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c(output: OutputHandlers) -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                (output.err)("Interrupted; cancelling run");
                trigger.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
    token
}

pub fn emit_report(output: OutputHandlers, suite: &SuiteReport) {
    (output.out)(&format_suite_report(suite));
}

/// Default report location under the configured report directory.
pub fn default_report_path(config: &QaflowConfig) -> PathBuf {
    config.run.report_dir.join(REPORT_FILE_NAME)
}

pub async fn write_report(path: &Path, suite: &SuiteReport) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(suite)?;
    tokio::fs::write(path, json).await?;
    info!(path = %path.display(), "Report written");
    Ok(())
}
