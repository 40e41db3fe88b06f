use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One authored instruction of a test case.
///
/// Wire shape: `{"action": "open", "targetUrl": ...}`, `{"action": "act", "request": {...}}`
/// or `{"action": "screenshot", "path": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepDescriptor {
    Open {
        #[serde(rename = "targetUrl")]
        target_url: String,
    },
    Act {
        request: ActRequest,
    },
    Screenshot {
        path: String,
    },
}

/// Element-level interaction carried by an `act` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActRequest {
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
    },
    Wait {
        selector: String,
        /// `None` falls back to the executor's configured wait timeout.
        #[serde(rename = "timeMs", default, skip_serializing_if = "Option::is_none")]
        time_ms: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepValidationError {
    #[error("{kind} request has an empty selector")]
    EmptySelector { kind: &'static str },
    #[error("open step has an empty targetUrl")]
    EmptyUrl,
    #[error("screenshot step has an empty path")]
    EmptyPath,
}

impl ActRequest {
    pub fn selector(&self) -> &str {
        match self {
            ActRequest::Click { selector }
            | ActRequest::Type { selector, .. }
            | ActRequest::Wait { selector, .. } => selector,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ActRequest::Click { .. } => "click",
            ActRequest::Type { .. } => "type",
            ActRequest::Wait { .. } => "wait",
        }
    }

    /// Copy of this request targeting a different selector.
    pub fn with_selector(&self, selector: impl Into<String>) -> Self {
        let selector = selector.into();
        match self {
            ActRequest::Click { .. } => ActRequest::Click { selector },
            ActRequest::Type { text, .. } => ActRequest::Type {
                selector,
                text: text.clone(),
            },
            ActRequest::Wait { time_ms, .. } => ActRequest::Wait {
                selector,
                time_ms: *time_ms,
            },
        }
    }

    pub fn validate(&self) -> Result<(), StepValidationError> {
        if self.selector().trim().is_empty() {
            return Err(StepValidationError::EmptySelector {
                kind: self.kind_name(),
            });
        }
        Ok(())
    }
}

impl StepDescriptor {
    pub fn open(url: impl Into<String>) -> Self {
        StepDescriptor::Open {
            target_url: url.into(),
        }
    }

    pub fn click(selector: impl Into<String>) -> Self {
        StepDescriptor::Act {
            request: ActRequest::Click {
                selector: selector.into(),
            },
        }
    }

    pub fn type_text(selector: impl Into<String>, text: impl Into<String>) -> Self {
        StepDescriptor::Act {
            request: ActRequest::Type {
                selector: selector.into(),
                text: text.into(),
            },
        }
    }

    pub fn wait(selector: impl Into<String>, time_ms: Option<u64>) -> Self {
        StepDescriptor::Act {
            request: ActRequest::Wait {
                selector: selector.into(),
                time_ms,
            },
        }
    }

    pub fn screenshot(path: impl Into<String>) -> Self {
        StepDescriptor::Screenshot { path: path.into() }
    }

    /// Short label used in reports, e.g. `open` or `act:click`.
    pub fn label(&self) -> String {
        match self {
            StepDescriptor::Open { .. } => "open".to_string(),
            StepDescriptor::Act { request } => format!("act:{}", request.kind_name()),
            StepDescriptor::Screenshot { .. } => "screenshot".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), StepValidationError> {
        match self {
            StepDescriptor::Open { target_url } if target_url.trim().is_empty() => {
                Err(StepValidationError::EmptyUrl)
            }
            StepDescriptor::Screenshot { path } if path.trim().is_empty() => {
                Err(StepValidationError::EmptyPath)
            }
            StepDescriptor::Act { request } => request.validate(),
            _ => Ok(()),
        }
    }
}

/// A named, ordered sequence of steps. Order is execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub steps: Vec<StepDescriptor>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, steps: Vec<StepDescriptor>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Validates every step, reporting the first offending index.
    pub fn validate(&self) -> Result<(), (usize, StepValidationError)> {
        for (index, step) in self.steps.iter().enumerate() {
            step.validate().map_err(|e| (index, e))?;
        }
        Ok(())
    }
}

/// How a provider should interpret a literal selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Css,
    XPath,
}

impl SelectorKind {
    pub fn classify(selector: &str) -> Self {
        let s = selector.trim_start();
        if s.starts_with('/') || s.starts_with("./") || s.starts_with('(') {
            SelectorKind::XPath
        } else {
            SelectorKind::Css
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_selectors() {
        assert_eq!(
            SelectorKind::classify("//input[@placeholder='登录账户']"),
            SelectorKind::XPath
        );
        assert_eq!(
            SelectorKind::classify("(//button)[2]"),
            SelectorKind::XPath
        );
        assert_eq!(SelectorKind::classify("#submit"), SelectorKind::Css);
        assert_eq!(SelectorKind::classify("div.el-dialog"), SelectorKind::Css);
    }

    #[test]
    fn with_selector_keeps_payload() {
        let req = ActRequest::Wait {
            selector: "@menu.home".into(),
            time_ms: Some(5000),
        };
        assert_eq!(
            req.with_selector("//span"),
            ActRequest::Wait {
                selector: "//span".into(),
                time_ms: Some(5000)
            }
        );
    }
}
