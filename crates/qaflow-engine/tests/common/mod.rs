#![allow(dead_code)]

use async_trait::async_trait;
use qaflow_engine::backend::{ElementHandle, NavigationResult, SessionError, SessionProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nmock";

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    NotInteractable,
    ConnectionLost,
}

impl Failure {
    fn error(self, selector: &str) -> SessionError {
        match self {
            Failure::NotInteractable => SessionError::NotInteractable {
                selector: selector.to_string(),
                reason: "element is disabled".into(),
            },
            Failure::ConnectionLost => SessionError::ConnectionLost,
        }
    }
}

/// Scripted page: elements appear at fixed offsets from construction.
pub struct MockSession {
    origin: Instant,
    elements: HashMap<String, Duration>,
    click_failures: HashMap<String, (u32, Failure)>,
    navigate_delay: Duration,
    lookup_latency: Duration,
    navigate_failure: Option<Failure>,
    screenshot_fails: bool,
    replaces_on_type: bool,
    next_token: u64,
    pub values: HashMap<String, String>,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elements: HashMap::new(),
            click_failures: HashMap::new(),
            navigate_delay: Duration::ZERO,
            lookup_latency: Duration::ZERO,
            navigate_failure: None,
            screenshot_fails: false,
            replaces_on_type: false,
            next_token: 0,
            values: HashMap::new(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_element(mut self, selector: &str) -> Self {
        self.elements.insert(selector.to_string(), Duration::ZERO);
        self
    }

    pub fn with_element_after(mut self, selector: &str, after: Duration) -> Self {
        self.elements.insert(selector.to_string(), after);
        self
    }

    /// The first `times` clicks on `selector` fail.
    pub fn failing_clicks(mut self, selector: &str, times: u32, failure: Failure) -> Self {
        self.click_failures
            .insert(selector.to_string(), (times, failure));
        self
    }

    pub fn with_navigate_delay(mut self, delay: Duration) -> Self {
        self.navigate_delay = delay;
        self
    }

    /// Every lookup costs one round trip; a budget shorter than that times out.
    pub fn with_lookup_latency(mut self, latency: Duration) -> Self {
        self.lookup_latency = latency;
        self
    }

    pub fn failing_navigation(mut self, failure: Failure) -> Self {
        self.navigate_failure = Some(failure);
        self
    }

    pub fn failing_screenshots(mut self) -> Self {
        self.screenshot_fails = true;
        self
    }

    pub fn replacing_on_type(mut self) -> Self {
        self.replaces_on_type = true;
        self
    }

    pub fn with_value(mut self, selector: &str, value: &str) -> Self {
        self.values.insert(selector.to_string(), value.to_string());
        self
    }

    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = log;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.log.lock().unwrap().push(call);
    }

    fn handle(&mut self, selector: &str) -> ElementHandle {
        self.next_token += 1;
        ElementHandle {
            selector: selector.to_string(),
            token: self.next_token,
        }
    }
}

#[async_trait]
impl SessionProvider for MockSession {
    async fn launch(&mut self) -> Result<(), SessionError> {
        self.record("launch".into());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.record("close".into());
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, SessionError> {
        self.record(format!("navigate:{}", url));
        if !self.navigate_delay.is_zero() {
            tokio::time::sleep(self.navigate_delay).await;
        }
        match self.navigate_failure {
            Some(Failure::ConnectionLost) => Err(SessionError::ConnectionLost),
            Some(Failure::NotInteractable) => Err(SessionError::Navigation("net::ERR_FAILED".into())),
            None => Ok(NavigationResult {
                url: url.to_string(),
                title: "Mock".into(),
            }),
        }
    }

    async fn find(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError> {
        self.record(format!("find:{}", selector));
        if !self.lookup_latency.is_zero() {
            if timeout < self.lookup_latency {
                tokio::time::sleep(timeout).await;
                return Err(SessionError::Timeout {
                    operation: format!("find {}", selector),
                });
            }
            tokio::time::sleep(self.lookup_latency).await;
        }
        let timeout = timeout.saturating_sub(self.lookup_latency);
        if let Some(after) = self.elements.get(selector) {
            let visible_at = self.origin + *after;
            let now = Instant::now();
            if visible_at <= now {
                return Ok(self.handle(selector));
            }
            if visible_at - now <= timeout {
                tokio::time::sleep_until(visible_at).await;
                return Ok(self.handle(selector));
            }
        }
        tokio::time::sleep(timeout).await;
        Err(SessionError::ElementNotFound {
            selector: selector.to_string(),
        })
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        self.record(format!("click:{}", element.selector));
        if let Some((remaining, failure)) = self.click_failures.get_mut(&element.selector)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(failure.error(&element.selector));
        }
        Ok(())
    }

    async fn type_text(
        &mut self,
        element: &ElementHandle,
        text: &str,
    ) -> Result<(), SessionError> {
        self.record(format!("type:{}:{}", element.selector, text));
        let value = self.values.entry(element.selector.clone()).or_default();
        if self.replaces_on_type {
            value.clear();
        }
        value.push_str(text);
        Ok(())
    }

    async fn clear(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        self.record(format!("clear:{}", element.selector));
        self.values.remove(&element.selector);
        Ok(())
    }

    fn replaces_on_type(&self) -> bool {
        self.replaces_on_type
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError> {
        self.record("screenshot".into());
        if self.screenshot_fails {
            return Err(SessionError::Capture("viewport unavailable".into()));
        }
        Ok(PNG_BYTES.to_vec())
    }
}
