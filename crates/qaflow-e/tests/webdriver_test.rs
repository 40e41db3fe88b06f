//! Runs against a live WebDriver server named by `QAFLOW_WEBDRIVER_URL`.
//!
//! Skipped when the variable is unset.

use qaflow_e::backend::WebDriverSession;
use qaflow_engine::backend::{SessionError, SessionProvider};
use serial_test::serial;
use std::time::Duration;

const FORM_PAGE: &str = "data:text/html,<html><head><title>Form</title></head><body>\
<input id='amount' value='100'>\
<button id='locked' disabled>Locked</button>\
</body></html>";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn connect() -> Option<WebDriverSession> {
    init_tracing();
    let url = std::env::var("QAFLOW_WEBDRIVER_URL").ok()?;
    let mut session = WebDriverSession::with_url(url);
    match session.launch().await {
        Ok(()) => Some(session),
        Err(e) => {
            eprintln!("Failed to connect to WebDriver: {}", e);
            None
        }
    }
}

#[tokio::test]
#[serial]
async fn test_webdriver_interactions() {
    let Some(mut session) = connect().await else {
        return;
    };

    let nav = session.navigate(FORM_PAGE).await.expect("Navigation failed");
    assert_eq!(nav.title, "Form");

    let short = Duration::from_millis(500);
    let amount = session.find("#amount", short).await.expect("lookup");
    session.clear(&amount).await.expect("clear");
    session.type_text(&amount, "250").await.expect("type");

    let locked = session
        .find("//button[@id='locked']", short)
        .await
        .expect("xpath lookup");
    assert!(matches!(
        session.click(&locked).await,
        Err(SessionError::NotInteractable { .. })
    ));

    assert!(matches!(
        session.find("#missing", short).await,
        Err(SessionError::ElementNotFound { .. }) | Err(SessionError::Timeout { .. })
    ));

    let png = session.screenshot().await.expect("screenshot");
    assert!(png.starts_with(b"\x89PNG"));

    session.close().await.expect("close");
}
