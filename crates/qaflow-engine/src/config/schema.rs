use crate::executor::ExecutorSettings;
use crate::runner::{DEFAULT_TOTP_PLACEHOLDER, FailurePolicy, RetryPolicy, RunSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid base URL for portal '{portal}': {reason}")]
    InvalidBaseUrl { portal: String, reason: String },
    #[error("Unknown portal '{0}'")]
    UnknownPortal(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaflowConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub environments: HashMap<Environment, EnvironmentProfile>,
    /// Credentials per portal. Opaque to the runner apart from `totp_secret`.
    #[serde(default)]
    pub portals: HashMap<String, PortalCredentials>,
    #[serde(default)]
    pub waits: WaitsConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub locators: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Test,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Test => f.write_str("test"),
            Environment::Production => f.write_str("production"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    /// Portal name to base URL, e.g. `admin: https://test-admin.example.com`.
    #[serde(default)]
    pub portals: HashMap<String, String>,
    #[serde(default)]
    pub gateway: Option<String>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PortalCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub totp_secret: Option<String>,
}

impl fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("username", &self.username)
            .field("password", &"********")
            .field("totp_secret", &self.totp_secret.as_ref().map(|_| "********"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitsConfig {
    #[serde(default = "default_page_ms")]
    pub page_ms: u64,
    #[serde(default = "default_element_ms")]
    pub element_ms: u64,
    #[serde(default = "default_dialog_ms")]
    pub dialog_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WaitsConfig {
    fn default() -> Self {
        Self {
            page_ms: default_page_ms(),
            element_ms: default_element_ms(),
            dialog_ms: default_dialog_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_page_ms() -> u64 {
    5000
}

fn default_element_ms() -> u64 {
    3000
}

fn default_dialog_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_totp_placeholder")]
    pub totp_placeholder: String,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    /// Upper bound on concurrently running cases in parallel mode.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            retry: RetryConfig::default(),
            totp_placeholder: default_totp_placeholder(),
            report_dir: default_report_dir(),
            max_parallel: default_max_parallel(),
        }
    }
}

fn default_totp_placeholder() -> String {
    DEFAULT_TOTP_PLACEHOLDER.to_string()
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("./reports")
}

fn default_max_parallel() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub allowed_ips: Vec<IpAddr>,
}

impl CallbackConfig {
    /// An empty allow-list admits nothing.
    pub fn allows(&self, source: &IpAddr) -> bool {
        self.allowed_ips.contains(source)
    }
}

impl QaflowConfig {
    pub fn profile(&self) -> Option<&EnvironmentProfile> {
        self.environments.get(&self.environment)
    }

    pub fn portal_base_url(&self, portal: &str) -> Option<&str> {
        self.profile()
            .and_then(|p| p.portals.get(portal))
            .map(String::as_str)
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            element_timeout: Duration::from_millis(self.waits.element_ms),
            wait_timeout: Duration::from_millis(self.waits.element_ms),
            poll_interval: Duration::from_millis(self.waits.poll_interval_ms),
        }
    }

    /// Builds runner settings for a portal in the selected environment.
    ///
    /// `policy` overrides the configured failure policy.
    pub fn run_settings(
        &self,
        portal: Option<&str>,
        policy: Option<FailurePolicy>,
    ) -> Result<RunSettings, SettingsError> {
        let (base_url, totp_secret) = match portal {
            Some(name) => {
                let base = self.portal_base_url(name);
                let credentials = self.portals.get(name);
                if base.is_none() && credentials.is_none() {
                    return Err(SettingsError::UnknownPortal(name.to_string()));
                }
                let base_url = base
                    .map(|raw| {
                        Url::parse(raw).map_err(|e| SettingsError::InvalidBaseUrl {
                            portal: name.to_string(),
                            reason: e.to_string(),
                        })
                    })
                    .transpose()?;
                (base_url, credentials.and_then(|c| c.totp_secret.clone()))
            }
            None => (None, None),
        };

        Ok(RunSettings {
            policy: policy.unwrap_or(self.run.failure_policy),
            retry: RetryPolicy {
                attempts: self.run.retry.attempts.max(1),
                delay: Duration::from_millis(self.run.retry.delay_ms),
            },
            executor: self.executor_settings(),
            navigation_timeout: Duration::from_millis(self.waits.page_ms),
            base_url,
            totp_placeholder: self.run.totp_placeholder.clone(),
            totp_secret,
        })
    }
}
