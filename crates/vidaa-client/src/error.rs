//! Client errors

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("not connected")]
    NotConnected,

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("io error: {0}")]
    Io(String),
}

impl ClientError {
    /// Whether the TV rejected our credentials
    ///
    /// Library errors do not always use [`ClientError::Auth`], so the message
    /// text is checked too.
    pub fn is_auth(&self) -> bool {
        if matches!(self, ClientError::Auth(_)) {
            return true;
        }
        let text = self.to_string().to_lowercase();
        ["auth", "unauthorized", "forbidden"]
            .iter()
            .any(|needle| text.contains(needle))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err.to_string())
    }
}
