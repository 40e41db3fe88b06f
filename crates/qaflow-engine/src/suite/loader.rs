//! Suite files.
//!
//! A suite file holds JSON in one of these shapes:
//!
//! - an array of steps: a single case named after the file stem;
//! - an object of case name to step array, in authored order;
//! - a manifest `{"policy": ..., "portal": ..., "cases": <either shape above>}`;
//! - an exported suite `{"tests": [{"name": ..., "steps": [...]}], "config": ...}`.
//!
//! An object is read as a manifest only when `cases` is its sole key besides `policy`
//! and `portal`, and as an export only when `tests` holds `{name, steps}` entries and
//! nothing but `config` sits beside it. Any other object is a map of named cases, so a
//! case may itself be called `cases` or `tests`.

use crate::runner::FailurePolicy;
use qaflow_common::protocol::{StepDescriptor, TestCase};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("Failed to read suite {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse suite {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Suite {path}: {reason}")]
    InvalidShape { path: PathBuf, reason: String },
    #[error("Suite {path}, case '{case}', step {index}: {reason}")]
    InvalidStep {
        path: PathBuf,
        case: String,
        index: usize,
        reason: String,
    },
    #[error("Invalid suite pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("No suite files match '{0}'")]
    NoMatch(String),
}

#[derive(Debug, Clone)]
pub struct SuiteFile {
    pub path: PathBuf,
    /// Declared by a manifest; `None` defers to configuration.
    pub policy: Option<FailurePolicy>,
    pub portal: Option<String>,
    pub cases: Vec<TestCase>,
}

pub struct SuiteLoader;

impl SuiteLoader {
    pub async fn load(path: &Path) -> Result<SuiteFile, SuiteError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SuiteError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<SuiteFile, SuiteError> {
        let root: Value = serde_json::from_str(content).map_err(|source| SuiteError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let shape_error = |reason: &str| SuiteError::InvalidShape {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if let Value::Object(obj) = &root
            && is_export(obj)
        {
            let cases = parse_export(path, root)?;
            return Ok(SuiteFile {
                path: path.to_path_buf(),
                policy: None,
                portal: None,
                cases,
            });
        }

        let (policy, portal, body) = match root {
            Value::Object(mut obj) if is_manifest(&obj) => {
                let policy = match obj.remove("policy") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => {
                        Some(s.parse::<FailurePolicy>().map_err(|e| shape_error(&e))?)
                    }
                    Some(_) => return Err(shape_error("policy must be a string")),
                };
                let portal = match obj.remove("portal") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s),
                    Some(_) => return Err(shape_error("portal must be a string")),
                };
                let body = obj.remove("cases").unwrap_or(Value::Null);
                (policy, portal, body)
            }
            other => (None, None, other),
        };

        let cases = match body {
            Value::Array(steps) => vec![parse_case(path, default_case_name(path), steps)?],
            Value::Object(named) => named
                .into_iter()
                .map(|(name, steps)| match steps {
                    Value::Array(steps) => parse_case(path, name, steps),
                    _ => Err(shape_error(&format!("case '{}' must be an array of steps", name))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(shape_error("expected an array of steps or an object of cases")),
        };

        if cases.is_empty() {
            return Err(shape_error("suite contains no cases"));
        }

        Ok(SuiteFile {
            path: path.to_path_buf(),
            policy,
            portal,
            cases,
        })
    }

    /// Expands glob patterns into suite paths, preserving pattern order.
    pub fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>, SuiteError> {
        let mut paths = Vec::new();
        for pattern in patterns {
            let mut matched: Vec<PathBuf> = glob::glob(pattern)?.filter_map(Result::ok).collect();
            if matched.is_empty() {
                return Err(SuiteError::NoMatch(pattern.clone()));
            }
            matched.sort();
            for path in matched {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        Ok(paths)
    }
}

const MANIFEST_KEYS: &[&str] = &["cases", "policy", "portal"];

fn is_manifest(obj: &Map<String, Value>) -> bool {
    matches!(obj.get("cases"), Some(Value::Array(_) | Value::Object(_)))
        && obj.keys().all(|k| MANIFEST_KEYS.contains(&k.as_str()))
}

fn is_export(obj: &Map<String, Value>) -> bool {
    let Some(Value::Array(tests)) = obj.get("tests") else {
        return false;
    };
    obj.keys().all(|k| k == "tests" || k == "config")
        && tests
            .iter()
            .all(|t| t.get("name").is_some() && t.get("steps").is_some())
}

/// Reads `{"tests": [{"name", "steps"}]}`; the embedded `config` is ignored.
fn parse_export(path: &Path, root: Value) -> Result<Vec<TestCase>, SuiteError> {
    let shape_error = |reason: String| SuiteError::InvalidShape {
        path: path.to_path_buf(),
        reason,
    };

    let Value::Object(mut obj) = root else {
        return Err(shape_error("expected an object".into()));
    };
    let Some(Value::Array(tests)) = obj.remove("tests") else {
        return Err(shape_error("tests must be an array".into()));
    };

    let mut cases = Vec::with_capacity(tests.len());
    for (index, mut test) in tests.into_iter().enumerate() {
        let name = match test.get_mut("name").map(Value::take) {
            Some(Value::String(name)) => name,
            _ => return Err(shape_error(format!("tests[{}].name must be a string", index))),
        };
        match test.get_mut("steps").map(Value::take) {
            Some(Value::Array(steps)) => cases.push(parse_case(path, name, steps)?),
            _ => {
                return Err(shape_error(format!(
                    "test '{}' must have an array of steps",
                    name
                )));
            }
        }
    }

    if cases.is_empty() {
        return Err(shape_error("suite contains no cases".into()));
    }
    Ok(cases)
}

fn default_case_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "case".to_string())
}

fn parse_case(path: &Path, name: String, raw: Vec<Value>) -> Result<TestCase, SuiteError> {
    let invalid = |index: usize, reason: String| SuiteError::InvalidStep {
        path: path.to_path_buf(),
        case: name.clone(),
        index,
        reason,
    };

    let mut steps = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        let step: StepDescriptor =
            serde_json::from_value(value).map_err(|e| invalid(index, e.to_string()))?;
        step.validate().map_err(|e| invalid(index, e.to_string()))?;
        steps.push(step);
    }

    Ok(TestCase::new(name, steps))
}
