//! Locator registry: semantic element names to selector strings.
//!
//! Locator files are nested mappings (YAML, or JSON which parses as YAML):
//!
//! ```yaml
//! login:
//!   username: "//input[@placeholder='登录账户']"
//!   submit: "//button[contains(text(),'登录')]"
//! ```
//!
//! Nested keys flatten to dotted names (`login.username`). Lookups are exact and
//! case-sensitive.

use serde_yaml::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Prefix marking a step selector as a registry reference instead of a literal.
pub const LOCATOR_REF_PREFIX: char = '@';

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("Unknown locator: {0}")]
    UnknownLocator(String),
    #[error("Locator '{key}' must map to a non-empty selector string")]
    InvalidEntry { key: String },
    #[error("Locator file root must be a mapping")]
    InvalidRoot,
    #[error("Failed to parse locator file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default)]
pub struct LocatorMap {
    entries: HashMap<String, String>,
}

impl LocatorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, LocatorError> {
        let root: Value = serde_yaml::from_str(content)?;
        let mut entries = HashMap::new();
        match root {
            Value::Null => {}
            Value::Mapping(_) => flatten("", &root, &mut entries)?,
            _ => return Err(LocatorError::InvalidRoot),
        }
        Ok(Self { entries })
    }

    pub fn resolve(&self, key: &str) -> Result<&str, LocatorError> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| LocatorError::UnknownLocator(key.to_string()))
    }

    /// Resolves `@key` references; any other selector is returned unchanged.
    pub fn expand<'a>(&'a self, selector: &'a str) -> Result<&'a str, LocatorError> {
        match selector.strip_prefix(LOCATOR_REF_PREFIX) {
            Some(key) => self.resolve(key),
            None => Ok(selector),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn flatten(
    prefix: &str,
    value: &Value,
    out: &mut HashMap<String, String>,
) -> Result<(), LocatorError> {
    let Value::Mapping(map) = value else {
        return Err(LocatorError::InvalidEntry {
            key: prefix.to_string(),
        });
    };

    for (k, v) in map {
        let segment = match k {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => {
                return Err(LocatorError::InvalidEntry {
                    key: format!("{}.?", prefix),
                });
            }
        };
        let key = if prefix.is_empty() {
            segment
        } else {
            format!("{}.{}", prefix, segment)
        };

        match v {
            Value::String(selector) if !selector.trim().is_empty() => {
                out.insert(key, selector.clone());
            }
            Value::Mapping(_) => flatten(&key, v, out)?,
            _ => return Err(LocatorError::InvalidEntry { key }),
        }
    }
    Ok(())
}
