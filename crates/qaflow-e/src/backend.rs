use crate::webdriver::{DEFAULT_WEBDRIVER_URL, WebDriverClient, headless_capabilities};
use async_trait::async_trait;
use fantoccini::Locator;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use qaflow_engine::backend::{ElementHandle, NavigationResult, SessionError, SessionProvider};
use qaflow_engine::protocol::SelectorKind;
use qaflow_engine::suite::ProviderFactory;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// A session on an already running WebDriver server (chromedriver, geckodriver, grid).
pub struct WebDriverSession {
    client: Option<WebDriverClient>,
    webdriver_url: String,
    headless: bool,
    elements: HashMap<u64, Element>,
    next_token: u64,
}

impl WebDriverSession {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_WEBDRIVER_URL.to_string())
    }

    pub fn with_url(webdriver_url: String) -> Self {
        Self {
            client: None,
            webdriver_url,
            headless: true,
            elements: HashMap::new(),
            next_token: 0,
        }
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.headless = !visible;
        self
    }

    fn element(&self, handle: &ElementHandle) -> Result<&Element, SessionError> {
        self.elements
            .get(&handle.token)
            .ok_or(SessionError::StaleHandle {
                token: handle.token,
            })
    }

    async fn get_navigation_result(
        client: &WebDriverClient,
    ) -> Result<NavigationResult, SessionError> {
        let title = client.client.title().await.unwrap_or_default();
        let url = client
            .client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(|e| session_error(e, SessionError::Navigation))?;
        Ok(NavigationResult { url, title })
    }
}

impl Default for WebDriverSession {
    fn default() -> Self {
        Self::new()
    }
}

fn session_error(err: CmdError, otherwise: impl FnOnce(String) -> SessionError) -> SessionError {
    match err {
        CmdError::Lost(_) => SessionError::ConnectionLost,
        other => otherwise(other.to_string()),
    }
}

fn interaction_error(selector: &str, err: CmdError) -> SessionError {
    session_error(err, |reason| SessionError::NotInteractable {
        selector: selector.to_string(),
        reason,
    })
}

fn locator(selector: &str) -> Locator<'_> {
    match SelectorKind::classify(selector) {
        SelectorKind::XPath => Locator::XPath(selector),
        SelectorKind::Css => Locator::Css(selector),
    }
}

#[async_trait]
impl SessionProvider for WebDriverSession {
    async fn launch(&mut self) -> Result<(), SessionError> {
        info!("Connecting to WebDriver at {}", self.webdriver_url);
        let caps = self.headless.then(headless_capabilities);
        let client = WebDriverClient::connect(&self.webdriver_url, caps)
            .await
            .map_err(|e| SessionError::Other(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.elements.clear();
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| SessionError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, SessionError> {
        let client = self.client.as_mut().ok_or(SessionError::NotReady)?;

        self.elements.clear();
        info!("Navigating to: {}", url);
        client
            .client
            .goto(url)
            .await
            .map_err(|e| session_error(e, SessionError::Navigation))?;

        Self::get_navigation_result(client).await
    }

    async fn find(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError> {
        let client = self.client.as_ref().ok_or(SessionError::NotReady)?;

        let element =
            match tokio::time::timeout(timeout, client.client.find(locator(selector))).await {
                Ok(Ok(element)) => element,
                Ok(Err(e)) if e.is_no_such_element() => {
                    return Err(SessionError::ElementNotFound {
                        selector: selector.to_string(),
                    });
                }
                Ok(Err(e)) => {
                    debug!(selector, "Lookup failed: {}", e);
                    return Err(session_error(e, SessionError::Other));
                }
                Err(_) => {
                    return Err(SessionError::Timeout {
                        operation: format!("find {}", selector),
                    });
                }
            };

        self.next_token += 1;
        let token = self.next_token;
        self.elements.insert(token, element);
        Ok(ElementHandle {
            selector: selector.to_string(),
            token,
        })
    }

    async fn click(&mut self, handle: &ElementHandle) -> Result<(), SessionError> {
        let element = self.element(handle)?;

        // WebDriver silently ignores clicks on disabled controls.
        let enabled = element
            .is_enabled()
            .await
            .map_err(|e| interaction_error(&handle.selector, e))?;
        if !enabled {
            return Err(SessionError::NotInteractable {
                selector: handle.selector.clone(),
                reason: "element is disabled".into(),
            });
        }

        element
            .click()
            .await
            .map_err(|e| interaction_error(&handle.selector, e))
    }

    async fn type_text(&mut self, handle: &ElementHandle, text: &str) -> Result<(), SessionError> {
        let element = self.element(handle)?;
        element
            .send_keys(text)
            .await
            .map_err(|e| interaction_error(&handle.selector, e))
    }

    async fn clear(&mut self, handle: &ElementHandle) -> Result<(), SessionError> {
        let element = self.element(handle)?;
        element
            .clear()
            .await
            .map_err(|e| interaction_error(&handle.selector, e))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError> {
        let client = self.client.as_ref().ok_or(SessionError::NotReady)?;
        client
            .client
            .screenshot()
            .await
            .map_err(|e| session_error(e, SessionError::Capture))
    }
}

/// Opens one WebDriver session per case against a shared driver endpoint.
pub struct WebDriverFactory {
    webdriver_url: String,
    visible: bool,
}

impl WebDriverFactory {
    pub fn new(webdriver_url: Option<String>, visible: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
            visible,
        }
    }
}

#[async_trait]
impl ProviderFactory for WebDriverFactory {
    async fn create(&self) -> Result<Box<dyn SessionProvider>, SessionError> {
        let mut session = WebDriverSession::with_url(self.webdriver_url.clone()).visible(self.visible);
        session.launch().await?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_pick_a_strategy() {
        assert!(matches!(locator("#user"), Locator::Css("#user")));
        assert!(matches!(locator("//input[@name='otp']"), Locator::XPath(_)));
        assert!(matches!(locator("(//button)[2]"), Locator::XPath(_)));
    }

    #[tokio::test]
    async fn unlaunched_session_is_not_ready() {
        let mut session = WebDriverSession::new();
        assert!(!session.is_ready().await);
        assert!(matches!(
            session.navigate("https://example.com").await,
            Err(SessionError::NotReady)
        ));
        assert!(matches!(
            session.find("#user", Duration::from_millis(10)).await,
            Err(SessionError::NotReady)
        ));
    }

    #[tokio::test]
    async fn unknown_handles_are_stale() {
        let mut session = WebDriverSession::new();
        let handle = ElementHandle {
            selector: "#user".into(),
            token: 7,
        };
        assert!(matches!(
            session.click(&handle).await,
            Err(SessionError::StaleHandle { token: 7 })
        ));
    }
}
