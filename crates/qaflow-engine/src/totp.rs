//! Time-based one-time passwords for portals guarded by an authenticator code.

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};

pub const TOTP_DIGITS: usize = 6;
pub const TOTP_STEP_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum TotpError {
    #[error("Invalid TOTP secret: {0}")]
    InvalidSecret(String),
    #[error("System clock error: {0}")]
    Clock(String),
}

/// Supplies the code typed into a TOTP field.
pub trait TotpProvider: Send + Sync {
    fn code(&self, secret: &str) -> Result<String, TotpError>;
}

/// RFC 6238 codes (SHA-1, six digits, 30 second step) from a base32 secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTotp;

impl SystemTotp {
    pub fn code_at(secret: &str, unix_secs: u64) -> Result<String, TotpError> {
        Ok(build(secret)?.generate(unix_secs))
    }

    pub fn now_secs() -> Result<u64, TotpError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .map_err(|e| TotpError::Clock(e.to_string()))
    }

    /// Seconds until the code generated at `unix_secs` rolls over.
    pub fn seconds_remaining(unix_secs: u64) -> u64 {
        TOTP_STEP_SECS - (unix_secs % TOTP_STEP_SECS)
    }
}

impl TotpProvider for SystemTotp {
    fn code(&self, secret: &str) -> Result<String, TotpError> {
        Self::code_at(secret, Self::now_secs()?)
    }
}

fn build(secret: &str) -> Result<TOTP, TotpError> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    if normalized.is_empty() {
        return Err(TotpError::InvalidSecret("empty secret".into()));
    }
    let bytes = Secret::Encoded(normalized)
        .to_bytes()
        .map_err(|e| TotpError::InvalidSecret(format!("{:?}", e)))?;
    Ok(TOTP::new_unchecked(
        Algorithm::SHA1,
        TOTP_DIGITS,
        1,
        TOTP_STEP_SECS,
        bytes,
    ))
}
