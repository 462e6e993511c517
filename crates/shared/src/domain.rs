use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The three directory collections a destination name can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Channel,
    User,
    Group,
}

impl EntityKind {
    /// Order in which kinds are probed when a caller does not name one.
    /// A name present in several collections resolves to the first kind here.
    pub const PROBE_ORDER: [EntityKind; 3] =
        [EntityKind::Channel, EntityKind::User, EntityKind::Group];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Channel => "channel",
            EntityKind::User => "user",
            EntityKind::Group => "group",
        }
    }

    /// Remote method returning the full collection.
    pub fn list_method(self) -> &'static str {
        match self {
            EntityKind::Channel => "channels.list",
            EntityKind::User => "users.list",
            EntityKind::Group => "groups.list",
        }
    }

    /// Field of the list response holding the collection.
    pub fn list_field(self) -> &'static str {
        match self {
            EntityKind::Channel => "channels",
            EntityKind::User => "members",
            EntityKind::Group => "groups",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "channel" | "channels" => Ok(EntityKind::Channel),
            "user" | "users" => Ok(EntityKind::User),
            "group" | "groups" => Ok(EntityKind::Group),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// A channel, user or group as returned by the platform.
///
/// Only `id` and `name` are interpreted; every other field is kept verbatim in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessageSession {
    pub id: String,
    pub user: String,
}

impl DirectMessageSession {
    pub fn new(id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user: user.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfIdentity {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}
