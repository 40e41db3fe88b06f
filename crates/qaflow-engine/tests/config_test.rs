use qaflow_engine::config::{ConfigError, ConfigLoader, Environment, QaflowConfig, SettingsError};
use qaflow_engine::runner::FailurePolicy;
use std::net::IpAddr;
use std::time::Duration;

const CONFIG: &str = r#"
environment: production
environments:
  test:
    portals:
      admin: https://test-admin.example.com
    gateway: https://test-gateway.example.com
  production:
    portals:
      admin: https://admin.example.com
      merch: https://merch.example.com
portals:
  admin:
    username: ops
    password: hunter2
    totp_secret: JBSWY3DPEHPK3PXP
  agent:
    username: agent01
    password: pw
waits:
  page_ms: 8000
  element_ms: 2000
run:
  failure_policy: continue-on-failure
  retry:
    attempts: 2
callback:
  url: https://callback.example.com/notify
  allowed_ips: ["10.0.0.5", "::1"]
"#;

fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("qaflow.yaml");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

#[tokio::test]
async fn test_load_full_config() {
    let (_dir, path) = write_config(CONFIG);
    let config = ConfigLoader::load_from(&path).await.unwrap();

    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.portal_base_url("admin"), Some("https://admin.example.com"));
    assert_eq!(config.portal_base_url("agent"), None);
    assert_eq!(config.waits.page_ms, 8000);
    assert_eq!(config.waits.element_ms, 2000);
    // Unset values keep their defaults.
    assert_eq!(config.waits.dialog_ms, 1000);
    assert_eq!(config.waits.poll_interval_ms, 250);
    assert_eq!(config.run.retry.delay_ms, 500);
    assert_eq!(config.run.totp_placeholder, "验证码");
    assert_eq!(config.run.failure_policy, FailurePolicy::ContinueOnFailure);
}

#[tokio::test]
async fn test_empty_file_gives_defaults() {
    let (_dir, path) = write_config("  \n");
    let config = ConfigLoader::load_from(&path).await.unwrap();

    assert_eq!(config.environment, Environment::Test);
    assert_eq!(config.waits.page_ms, 5000);
    assert_eq!(config.waits.element_ms, 3000);
    assert_eq!(config.run.failure_policy, FailurePolicy::StopOnFailure);
    assert_eq!(config.run.max_parallel, 4);
}

#[tokio::test]
async fn test_malformed_and_missing_files() {
    let (_dir, path) = write_config("waits: [unclosed");
    assert!(matches!(
        ConfigLoader::load_from(&path).await,
        Err(ConfigError::Parse(_))
    ));

    let missing = std::path::Path::new("/nonexistent/qaflow.yaml");
    assert!(matches!(
        ConfigLoader::load_from(missing).await,
        Err(ConfigError::Io { .. })
    ));
}

#[tokio::test]
async fn test_load_nested_locators() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locators.yaml");
    std::fs::write(
        &path,
        "login:\n  username: \"input[name='username']\"\n  submit: //button[@type='submit']\n",
    )
    .unwrap();

    let locators = ConfigLoader::load_locators(&path).await.unwrap();
    assert_eq!(locators.resolve("login.username").unwrap(), "input[name='username']");
    assert_eq!(locators.resolve("login.submit").unwrap(), "//button[@type='submit']");

    std::fs::write(&path, "login:\n  username: 3\n").unwrap();
    assert!(matches!(
        ConfigLoader::load_locators(&path).await,
        Err(ConfigError::Locators { .. })
    ));
}

#[test]
fn test_run_settings_for_portal() {
    let config: QaflowConfig = serde_yaml::from_str(CONFIG).unwrap();
    let settings = config.run_settings(Some("admin"), None).unwrap();

    assert_eq!(
        settings.base_url.as_ref().map(|u| u.as_str()),
        Some("https://admin.example.com/")
    );
    assert_eq!(settings.totp_secret.as_deref(), Some("JBSWY3DPEHPK3PXP"));
    assert_eq!(settings.policy, FailurePolicy::ContinueOnFailure);
    assert_eq!(settings.navigation_timeout, Duration::from_millis(8000));
    assert_eq!(settings.executor.element_timeout, Duration::from_millis(2000));
    assert_eq!(settings.executor.wait_timeout, Duration::from_millis(2000));
    assert_eq!(settings.retry.attempts, 2);

    let overridden = config
        .run_settings(Some("admin"), Some(FailurePolicy::StopOnFailure))
        .unwrap();
    assert_eq!(overridden.policy, FailurePolicy::StopOnFailure);
}

#[test]
fn test_run_settings_portal_lookup() {
    let config: QaflowConfig = serde_yaml::from_str(CONFIG).unwrap();

    // Credentials without a URL in this environment.
    let agent = config.run_settings(Some("agent"), None).unwrap();
    assert!(agent.base_url.is_none());
    assert!(agent.totp_secret.is_none());

    assert!(matches!(
        config.run_settings(Some("nobody"), None),
        Err(SettingsError::UnknownPortal(_))
    ));

    let anonymous = config.run_settings(None, None).unwrap();
    assert!(anonymous.base_url.is_none());
}

#[test]
fn test_invalid_base_url() {
    let config: QaflowConfig = serde_yaml::from_str(
        "environments:\n  test:\n    portals:\n      admin: \"not a url\"\n",
    )
    .unwrap();
    assert!(matches!(
        config.run_settings(Some("admin"), None),
        Err(SettingsError::InvalidBaseUrl { .. })
    ));
}

#[test]
fn test_callback_allow_list() {
    let config: QaflowConfig = serde_yaml::from_str(CONFIG).unwrap();
    let allowed: IpAddr = "10.0.0.5".parse().unwrap();
    let loopback: IpAddr = "::1".parse().unwrap();
    let stranger: IpAddr = "10.0.0.6".parse().unwrap();

    assert!(config.callback.allows(&allowed));
    assert!(config.callback.allows(&loopback));
    assert!(!config.callback.allows(&stranger));
    assert!(!QaflowConfig::default().callback.allows(&allowed));
}

#[test]
fn test_credentials_are_masked_in_debug() {
    let config: QaflowConfig = serde_yaml::from_str(CONFIG).unwrap();
    let rendered = format!("{:?}", config.portals["admin"]);

    assert!(rendered.contains("ops"));
    assert!(!rendered.contains("hunter2"));
    assert!(!rendered.contains("JBSWY3DPEHPK3PXP"));
}

#[test]
fn test_environment_names() {
    assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
    assert_eq!(" TEST ".parse::<Environment>().unwrap(), Environment::Test);
    assert!("staging".parse::<Environment>().is_err());
    assert_eq!(Environment::Production.to_string(), "production");
}
