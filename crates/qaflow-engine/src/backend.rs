use async_trait::async_trait;
pub use qaflow_common::error::SessionError;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
}

/// Provider-issued reference to a located element.
///
/// `token` is only meaningful to the provider that issued it and is invalidated
/// by navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub selector: String,
    pub token: u64,
}

/// A live, navigable browser page. Each concurrently running case needs its own instance.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Launch the provider (start browser, connect to driver, etc.)
    async fn launch(&mut self) -> Result<(), SessionError>;

    /// Close the provider and cleanup resources.
    async fn close(&mut self) -> Result<(), SessionError>;

    async fn is_ready(&self) -> bool;

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, SessionError>;

    /// A single lookup attempt that gives up after `timeout`.
    ///
    /// Returns `ElementNotFound` when nothing matches; callers own the polling.
    async fn find(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError>;

    async fn type_text(&mut self, element: &ElementHandle, text: &str)
    -> Result<(), SessionError>;

    /// Remove any existing content from an input.
    async fn clear(&mut self, _element: &ElementHandle) -> Result<(), SessionError> {
        Err(SessionError::NotSupported("clear".into()))
    }

    /// True when `type_text` already replaces existing content.
    fn replaces_on_type(&self) -> bool {
        false
    }

    /// Capture a PNG of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError>;

    /// Capture a screenshot into `path`, creating parent directories as needed.
    async fn capture(&mut self, path: &Path) -> Result<(), SessionError> {
        let bytes = self.screenshot().await?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &bytes).await?;
        Ok(())
    }
}
