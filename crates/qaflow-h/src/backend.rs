use crate::cdp::CdpClient;
use async_trait::async_trait;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use qaflow_engine::backend::{ElementHandle, NavigationResult, SessionError, SessionProvider};
use qaflow_engine::protocol::SelectorKind;
use qaflow_engine::suite::ProviderFactory;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Returns a reason string when the element cannot take a click, else "".
const CLICKABLE_JS: &str = r#"function() {
    if (this.disabled) { return 'element is disabled'; }
    const rect = this.getBoundingClientRect();
    if (rect.width === 0 || rect.height === 0) { return 'element has no size'; }
    return '';
}"#;

/// Empties an input the way a user would, so frameworks see the change.
const CLEAR_JS: &str = r#"function() {
    if ('value' in this) {
        this.value = '';
        this.dispatchEvent(new Event('input', { bubbles: true }));
        this.dispatchEvent(new Event('change', { bubbles: true }));
    } else if (this.isContentEditable) {
        this.textContent = '';
    }
}"#;

pub struct HeadlessSession {
    client: Option<CdpClient>,
    visible: bool,
    elements: HashMap<u64, Element>,
    next_token: u64,
}

impl HeadlessSession {
    pub fn new() -> Self {
        Self::new_with_visibility(false)
    }

    pub fn new_with_visibility(visible: bool) -> Self {
        Self {
            client: None,
            visible,
            elements: HashMap::new(),
            next_token: 0,
        }
    }

    pub fn get_client(&self) -> Option<&CdpClient> {
        self.client.as_ref()
    }

    fn element(&self, handle: &ElementHandle) -> Result<&Element, SessionError> {
        self.elements
            .get(&handle.token)
            .ok_or(SessionError::StaleHandle {
                token: handle.token,
            })
    }

    async fn get_navigation_result(
        page: &chromiumoxide::Page,
    ) -> Result<NavigationResult, SessionError> {
        let title = page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = page
            .url()
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))?
            .unwrap_or_default();
        Ok(NavigationResult { url, title })
    }
}

impl Default for HeadlessSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Session loss shows up as a dead websocket or a closed command channel.
fn is_disconnect(err: &CdpError) -> bool {
    matches!(err, CdpError::Ws(_) | CdpError::ChannelSendError(_))
}

fn interaction_error(selector: &str, err: CdpError) -> SessionError {
    if is_disconnect(&err) {
        SessionError::ConnectionLost
    } else {
        SessionError::NotInteractable {
            selector: selector.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl SessionProvider for HeadlessSession {
    async fn launch(&mut self) -> Result<(), SessionError> {
        info!("Launching headless session (Chromium)...");
        let client = CdpClient::launch(self.visible)
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

        // Handles from the previous document are meaningless now.
        self.elements.clear();
        info!("Navigating to: {}", url);
        client.page.goto(url).await.map_err(|e| {
            if is_disconnect(&e) {
                SessionError::ConnectionLost
            } else {
                SessionError::Navigation(e.to_string())
            }
        })?;

        Self::get_navigation_result(&client.page).await
    }

    async fn find(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError> {
        let client = self.client.as_ref().ok_or(SessionError::NotReady)?;

        let lookup = async {
            match SelectorKind::classify(selector) {
                SelectorKind::XPath => client.page.find_xpath(selector).await,
                SelectorKind::Css => client.page.find_element(selector).await,
            }
        };

        let element = match tokio::time::timeout(timeout, lookup).await {
            Ok(Ok(element)) => element,
            Ok(Err(e)) if is_disconnect(&e) => return Err(SessionError::ConnectionLost),
            Ok(Err(e)) => {
                debug!(selector, "Lookup missed: {}", e);
                return Err(SessionError::ElementNotFound {
                    selector: selector.to_string(),
                });
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

        let verdict = element
            .call_js_fn(CLICKABLE_JS, false)
            .await
            .map_err(|e| interaction_error(&handle.selector, e))?;
        if let Some(reason) = verdict.result.value.as_ref().and_then(|v| v.as_str())
            && !reason.is_empty()
        {
            return Err(SessionError::NotInteractable {
                selector: handle.selector.clone(),
                reason: reason.to_string(),
            });
        }

        element
            .click()
            .await
            .map_err(|e| interaction_error(&handle.selector, e))?;
        Ok(())
    }

    async fn type_text(&mut self, handle: &ElementHandle, text: &str) -> Result<(), SessionError> {
        let element = self.element(handle)?;
        element
            .focus()
            .await
            .map_err(|e| interaction_error(&handle.selector, e))?;
        element
            .type_str(text)
            .await
            .map_err(|e| interaction_error(&handle.selector, e))?;
        Ok(())
    }

    async fn clear(&mut self, handle: &ElementHandle) -> Result<(), SessionError> {
        let element = self.element(handle)?;
        element
            .call_js_fn(CLEAR_JS, false)
            .await
            .map_err(|e| interaction_error(&handle.selector, e))?;
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError> {
        let client = self.client.as_ref().ok_or(SessionError::NotReady)?;
        let bytes = client
            .page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|e| {
                if is_disconnect(&e) {
                    SessionError::ConnectionLost
                } else {
                    SessionError::Capture(e.to_string())
                }
            })?;

        Ok(bytes)
    }
}

/// Launches one isolated browser per case for parallel runs.
pub struct HeadlessFactory {
    visible: bool,
}

impl HeadlessFactory {
    pub fn new(visible: bool) -> Self {
        Self { visible }
    }
}

#[async_trait]
impl ProviderFactory for HeadlessFactory {
    async fn create(&self) -> Result<Box<dyn SessionProvider>, SessionError> {
        let mut session = HeadlessSession::new_with_visibility(self.visible);
        session.launch().await?;
        Ok(Box::new(session))
    }
}
