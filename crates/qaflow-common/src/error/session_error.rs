/// Failures reported by a session provider.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    // ============================================================
    // Navigation Errors
    // ============================================================
    #[error("Navigation failed: {0}")]
    Navigation(String),

    // ============================================================
    // Element Errors
    // ============================================================
    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Element {selector} is not interactable: {reason}")]
    NotInteractable { selector: String, reason: String },

    #[error("Element handle {token} is stale")]
    StaleHandle { token: u64 },

    // ============================================================
    // Execution Errors
    // ============================================================
    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    // ============================================================
    // System Errors
    // ============================================================
    #[error("Connection lost")]
    ConnectionLost,

    #[error("Not ready")]
    NotReady,

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl SessionError {
    /// The session itself is gone; nothing further can run against it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::ConnectionLost | SessionError::NotReady)
    }
}
