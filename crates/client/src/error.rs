use thiserror::Error;

use crate::retry::is_rate_limited;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote answered with an error payload or a non-success status.
    #[error("remote API error (HTTP {status}) {code}: {description}")]
    Api { status: u16, code: String, description: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("could not decode remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Api { status, code, .. } => is_rate_limited(*status, code),
            Self::Transport(_) | Self::Decode(_) => false,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        // Webhook URLs embed the credential, keep them out of messages.
        let err = err.without_url();
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_timeout() {
            Self::Transport(format!("request timed out: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}
