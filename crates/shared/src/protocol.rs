use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{DirectMessageSession, Entity, SelfIdentity, TeamSummary};

/// Remote method starting a realtime session.
pub const RTM_START: &str = "rtm.start";
pub const IM_OPEN: &str = "im.open";
pub const CHAT_POST_MESSAGE: &str = "chat.postMessage";
pub const CHAT_UPDATE: &str = "chat.update";

/// Realtime frame type advertising an alternate endpoint for the next reconnect.
pub const RECONNECT_URL_EVENT: &str = "reconnect_url";

/// Successful response body of a remote call, `ok` field included.
pub type RpcPayload = Map<String, Value>;

/// Flat parameter set for a remote call.
///
/// Values stay structured until [`Params::into_form`] flattens them for the
/// wire: strings pass through, scalars are stringified, arrays and objects
/// are serialized as JSON text and nulls are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_form(self) -> Vec<(String, String)> {
        self.0
            .into_iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(text) => text,
                    Value::Bool(flag) => flag.to_string(),
                    Value::Number(number) => number.to_string(),
                    structured @ (Value::Array(_) | Value::Object(_)) => structured.to_string(),
                };
                Some((key, text))
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Decoded `rtm.start` payload.
///
/// Collections are optional: the platform may omit any of them, in which case
/// the directory fetches them lazily.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSessionStart {
    pub url: String,
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_identity: Option<SelfIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<Entity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<Entity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<Entity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ims: Option<Vec<DirectMessageSession>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenDmResponse {
    pub channel: OpenedDmChannel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenedDmChannel {
    pub id: String,
}

/// One inbound frame exactly as the socket delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl RawFrame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RawFrame::Text(text) => text.as_bytes(),
            RawFrame::Binary(bytes) => bytes,
        }
    }
}

/// Payload of a `socket.message` event.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageData {
    Json(Value),
    /// The frame did not parse as JSON and is passed through untouched.
    Opaque(RawFrame),
}

impl MessageData {
    pub fn parse(frame: &RawFrame) -> Self {
        match serde_json::from_slice::<Value>(frame.as_bytes()) {
            Ok(value) => MessageData::Json(value),
            Err(_) => MessageData::Opaque(frame.clone()),
        }
    }

    pub fn message_type(&self) -> Option<&str> {
        match self {
            MessageData::Json(value) => value.get("type").and_then(Value::as_str),
            MessageData::Opaque(_) => None,
        }
    }

    /// Endpoint carried by a `reconnect_url` frame.
    pub fn advertised_reconnect_url(&self) -> Option<&str> {
        let MessageData::Json(value) = self else {
            return None;
        };
        if self.message_type() != Some(RECONNECT_URL_EVENT) {
            return None;
        }
        value.get("url").and_then(Value::as_str)
    }
}

/// Domain events published to the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum BotEvent {
    Login,
    Logout,
    SocketOpen,
    SocketClose { code: u16, message: String },
    SocketError { error: String },
    SocketPing { data: Vec<u8> },
    SocketPong { data: Vec<u8> },
    SocketMessage { data: MessageData, raw: RawFrame },
}

impl BotEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BotEvent::Login => "login",
            BotEvent::Logout => "logout",
            BotEvent::SocketOpen => "socket.open",
            BotEvent::SocketClose { .. } => "socket.close",
            BotEvent::SocketError { .. } => "socket.error",
            BotEvent::SocketPing { .. } => "socket.ping",
            BotEvent::SocketPong { .. } => "socket.pong",
            BotEvent::SocketMessage { .. } => "socket.message",
        }
    }
}
