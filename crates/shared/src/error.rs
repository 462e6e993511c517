use thiserror::Error;

use crate::domain::EntityKind;

/// Every failure the client core can report.
///
/// Transport and application failures both mean "no result" to the caller; the
/// variant only carries the diagnostic.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport failure calling {method}: {message}")]
    Transport { method: String, message: String },
    #[error("{method} rejected: {error}")]
    Api { method: String, error: String },
    #[error("failed to decode {method} response: {message}")]
    Decode { method: String, message: String },
    #[error("not logged in: no realtime session recorded")]
    NotLoggedIn,
    #[error("websocket not connected")]
    NotConnected,
    #[error("socket failure: {0}")]
    Socket(String),
    #[error("{kind} (name:{name}) could not be resolved")]
    Unresolved { kind: EntityKind, name: String },
}

impl ClientError {
    pub fn transport(method: &str, message: impl ToString) -> Self {
        Self::Transport {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    pub fn decode(method: &str, message: impl ToString) -> Self {
        Self::Decode {
            method: method.to_string(),
            message: message.to_string(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
