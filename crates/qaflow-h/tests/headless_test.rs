use qaflow_engine::backend::{SessionError, SessionProvider};
use qaflow_engine::locator::LocatorMap;
use qaflow_engine::protocol::{StepDescriptor, TestCase};
use qaflow_engine::report::{ErrorKind, RunState};
use qaflow_engine::runner::{CaseRunner, RunSettings};
use qaflow_h::backend::HeadlessSession;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const LOGIN_PAGE: &str = "data:text/html,<html><head><title>Login</title></head><body>\
<input id='user' value='stale'>\
<button id='submit' onclick=\"document.title='Submitted'\">Sign in</button>\
<button id='locked' disabled>Locked</button>\
</body></html>";

async fn launch() -> Option<HeadlessSession> {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init()
        .ok();

    let mut session = HeadlessSession::new();
    match session.launch().await {
        Ok(()) => Some(session),
        Err(e) => {
            eprintln!("Failed to launch browser (is Chromium installed?): {}", e);
            None
        }
    }
}

#[tokio::test]
#[serial]
async fn test_headless_find_click_type() {
    let Some(mut session) = launch().await else {
        return;
    };

    let nav = session.navigate(LOGIN_PAGE).await.expect("Navigation failed");
    assert_eq!(nav.title, "Login");

    let short = Duration::from_millis(500);
    let user = session.find("#user", short).await.expect("css lookup");
    session.clear(&user).await.expect("clear");
    session.type_text(&user, "admin").await.expect("type");
    let value = session
        .get_client()
        .unwrap()
        .page
        .evaluate("document.getElementById('user').value")
        .await
        .expect("evaluate")
        .into_value::<String>()
        .expect("string value");
    assert_eq!(value, "admin");

    let submit = session
        .find("//button[@id='submit']", short)
        .await
        .expect("xpath lookup");
    session.click(&submit).await.expect("click");

    let locked = session.find("#locked", short).await.expect("lookup");
    assert!(matches!(
        session.click(&locked).await,
        Err(SessionError::NotInteractable { .. })
    ));

    assert!(matches!(
        session.find("#missing", short).await,
        Err(SessionError::ElementNotFound { .. }) | Err(SessionError::Timeout { .. })
    ));

    session.navigate(LOGIN_PAGE).await.expect("Navigation failed");
    assert!(matches!(
        session.click(&submit).await,
        Err(SessionError::StaleHandle { .. })
    ));

    session.close().await.expect("close");
}

#[tokio::test]
#[serial]
async fn test_headless_case_run() {
    let Some(mut session) = launch().await else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let shot = dir.path().join("login.png");

    let locators = LocatorMap::from_entries([("login.submit", "#submit")]);
    let runner = CaseRunner::new(RunSettings::default(), Arc::new(locators));
    let case = TestCase::new(
        "login",
        vec![
            StepDescriptor::open(LOGIN_PAGE),
            StepDescriptor::wait("#user", Some(2000)),
            StepDescriptor::type_text("#user", "admin"),
            StepDescriptor::click("@login.submit"),
            StepDescriptor::screenshot(shot.to_string_lossy()),
            StepDescriptor::wait("#never", Some(300)),
        ],
    );

    let report = runner
        .run(&mut session, &case, &CancellationToken::new())
        .await;

    assert_eq!(report.state(), RunState::Aborted);
    assert_eq!(report.first_error().unwrap().kind, ErrorKind::Timeout);
    assert_eq!(report.first_error().unwrap().step_index, 5);
    assert!(shot.exists());

    session.close().await.expect("close");
}
