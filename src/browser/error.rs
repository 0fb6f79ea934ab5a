use thiserror::Error;

/// Failures reported by a [`super::Browser`].
///
/// Only `SessionLost` is fatal. The other two are expected on a portal whose
/// DOM is rebuilt underneath us and are absorbed by the caller.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("stale element during {0}")]
    Stale(&'static str),

    #[error("{op} failed: {message}")]
    Command { op: &'static str, message: String },

    #[error("browser session lost during {op}: {message}")]
    SessionLost { op: &'static str, message: String },
}

impl BrowserError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrowserError::SessionLost { .. })
    }

    pub fn command(op: &'static str, message: impl Into<String>) -> Self {
        BrowserError::Command {
            op,
            message: message.into(),
        }
    }

    pub fn session_lost(op: &'static str, message: impl Into<String>) -> Self {
        BrowserError::SessionLost {
            op,
            message: message.into(),
        }
    }

    /// Sort a driver error message into one of the three classes using the
    /// W3C WebDriver error codes it carries.
    pub fn classify(op: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("stale element") {
            return BrowserError::Stale(op);
        }
        const FATAL: [&str; 6] = [
            "invalid session id",
            "no such window",
            "session deleted",
            "session not created",
            "did not respond",
            "connection",
        ];
        if FATAL.iter().any(|needle| lower.contains(needle)) {
            return BrowserError::SessionLost { op, message };
        }
        BrowserError::Command { op, message }
    }
}
