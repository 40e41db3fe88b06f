use super::loader::SuiteFile;
use qaflow_common::locator::{LOCATOR_REF_PREFIX, LocatorMap};
use qaflow_common::protocol::StepDescriptor;
use std::fmt;

/// Suggestions below this similarity are not offered.
const SUGGESTION_THRESHOLD: f64 = 0.85;

/// A `@key` selector that the registry cannot resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceIssue {
    pub case: String,
    pub step_index: usize,
    pub key: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for ReferenceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "case '{}', step {}: unknown locator '{}'",
            self.case, self.step_index, self.key
        )?;
        if let Some(s) = &self.suggestion {
            write!(f, " (did you mean '{}'?)", s)?;
        }
        Ok(())
    }
}

pub fn check_references(suite: &SuiteFile, locators: &LocatorMap) -> Vec<ReferenceIssue> {
    let mut issues = Vec::new();
    for case in &suite.cases {
        for (index, step) in case.steps.iter().enumerate() {
            let StepDescriptor::Act { request } = step else {
                continue;
            };
            let Some(key) = request.selector().strip_prefix(LOCATOR_REF_PREFIX) else {
                continue;
            };
            if locators.contains(key) {
                continue;
            }
            issues.push(ReferenceIssue {
                case: case.name.clone(),
                step_index: index,
                key: key.to_string(),
                suggestion: closest_key(key, locators),
            });
        }
    }
    issues
}

fn closest_key(key: &str, locators: &LocatorMap) -> Option<String> {
    locators
        .keys()
        .map(|candidate| (candidate, strsim::jaro_winkler(key, candidate)))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate.to_string())
}
