use crate::locator::LocatorMap;
use crate::protocol::{ActRequest, StepDescriptor};
use crate::report::{RunReport, RunState, StepStatus, SuiteReport};

/// Selector fragments marking an input whose typed text must not be shown.
const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "totp",
    "otp",
    "密码",
    "验证码",
    "密钥",
];

const MASK: &str = "••••••••";

pub fn describe_step(step: &StepDescriptor) -> String {
    match step {
        StepDescriptor::Open { target_url } => format!("open {}", target_url),
        StepDescriptor::Screenshot { path } => format!("screenshot {}", path),
        StepDescriptor::Act { request } => describe_request(request),
    }
}

pub fn describe_request(request: &ActRequest) -> String {
    match request {
        ActRequest::Click { selector } => format!("click {}", selector),
        ActRequest::Type { selector, text } => {
            format!("type {} {:?}", selector, mask_sensitive(text, selector, &[]))
        }
        ActRequest::Wait { selector, time_ms } => match time_ms {
            Some(ms) => format!("wait {} ({}ms)", selector, ms),
            None => format!("wait {}", selector),
        },
    }
}

/// Describes `step` as it will run: typed text is also masked when an `@key`
/// reference resolves to a sensitive selector.
pub fn describe_resolved_step(step: &StepDescriptor, locators: &LocatorMap) -> String {
    match step {
        StepDescriptor::Act {
            request: ActRequest::Type { selector, text },
        } => {
            let resolved = locators.expand(selector).unwrap_or(selector.as_str());
            let shown = if is_sensitive(resolved, &[]) {
                MASK.to_string()
            } else {
                mask_sensitive(text, selector, &[])
            };
            format!("type {} {:?}", selector, shown)
        }
        other => describe_step(other),
    }
}

fn is_sensitive(field_name: &str, sensitive_fields: &[String]) -> bool {
    let lower_field = field_name.to_lowercase();

    sensitive_fields
        .iter()
        .any(|f| lower_field.contains(&f.to_lowercase()))
        || DEFAULT_SENSITIVE_FIELDS
            .iter()
            .any(|f| lower_field.contains(*f))
}

pub fn mask_sensitive(value: &str, field_name: &str, sensitive_fields: &[String]) -> String {
    if is_sensitive(field_name, sensitive_fields) {
        MASK.to_string()
    } else {
        value.to_string()
    }
}

pub fn format_run_report(report: &RunReport) -> String {
    let state = match report.state() {
        RunState::Completed if report.passed() => "PASSED",
        RunState::Completed => "COMPLETED WITH FAILURES",
        RunState::Aborted => "ABORTED",
        RunState::Pending | RunState::Running => "INCOMPLETE",
    };

    let mut output = format!(
        "== {} [{}] {}ms\n",
        report.case_name(),
        state,
        report.duration_ms()
    );

    for step in report.steps() {
        let glyph = match step.status {
            StepStatus::Pass => "ok  ",
            StepStatus::Fail => "FAIL",
            StepStatus::Skipped => "skip",
        };
        output.push_str(&format!(
            "  [{}] {} {} ({}ms)",
            step.step_index, glyph, step.description, step.duration_ms
        ));
        if step.attempts > 1 {
            output.push_str(&format!(" after {} attempts", step.attempts));
        }
        output.push('\n');
        if let Some(err) = &step.error {
            output.push_str(&format!("         {}: {}\n", err.kind, err.message));
        }
    }

    for artifact in report.artifacts() {
        output.push_str(&format!("  artifact: {}\n", artifact.display()));
    }

    output
}

pub fn format_suite_report(suite: &SuiteReport) -> String {
    let mut output = String::new();
    for case in &suite.cases {
        output.push_str(&format_run_report(case));
    }

    let passed = suite.cases.iter().filter(|c| c.passed()).count();
    output.push_str(&format!(
        "\n{} case(s): {} passed, {} failed",
        suite.cases.len() + suite.not_run.len(),
        passed,
        suite.cases.len() - passed
    ));
    if !suite.not_run.is_empty() {
        output.push_str(&format!(
            ", {} not run ({})",
            suite.not_run.len(),
            suite.not_run.join(", ")
        ));
    }
    output.push('\n');
    if let Some(fatal) = &suite.fatal_error {
        output.push_str(&format!("suite stopped: {}\n", fatal));
    }
    output
}
