use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::{
    domain::{DirectMessageSession, Entity, EntityKind},
    error::{ClientError, ClientResult},
    protocol::{Params, RealtimeSessionStart, RpcPayload},
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::rpc::RemoteProcedureClient;

/// Loaded collections. `None` means never fetched; an empty vector is a
/// successful fetch that returned nothing.
#[derive(Default)]
struct Snapshot {
    channels: Option<Arc<Vec<Entity>>>,
    users: Option<Arc<Vec<Entity>>>,
    groups: Option<Arc<Vec<Entity>>>,
    dm_sessions: Option<Arc<Vec<DirectMessageSession>>>,
}

impl Snapshot {
    fn slot(&self, kind: EntityKind) -> &Option<Arc<Vec<Entity>>> {
        match kind {
            EntityKind::Channel => &self.channels,
            EntityKind::User => &self.users,
            EntityKind::Group => &self.groups,
        }
    }

    fn slot_mut(&mut self, kind: EntityKind) -> &mut Option<Arc<Vec<Entity>>> {
        match kind {
            EntityKind::Channel => &mut self.channels,
            EntityKind::User => &mut self.users,
            EntityKind::Group => &mut self.groups,
        }
    }
}

/// Lazily populated cache of channels, users, groups and DM sessions.
///
/// The lock is never held across a remote call. A refresh commits by swapping
/// one collection's `Arc`, and only after the response decoded, so a failed
/// refresh leaves the previous snapshot in place. Concurrent first-time
/// lookups of the same collection each issue their own fetch.
pub struct Directory {
    rpc: Arc<dyn RemoteProcedureClient>,
    cached: AtomicBool,
    snapshot: RwLock<Snapshot>,
}

impl Directory {
    pub fn new(rpc: Arc<dyn RemoteProcedureClient>, cached: bool) -> Self {
        Self {
            rpc,
            cached: AtomicBool::new(cached),
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    pub fn set_cached(&self, cached: bool) {
        self.cached.store(cached, Ordering::Relaxed);
    }

    pub fn is_cached(&self) -> bool {
        self.cached.load(Ordering::Relaxed)
    }

    pub async fn list(&self, kind: EntityKind) -> ClientResult<Arc<Vec<Entity>>> {
        if self.is_cached() {
            if let Some(entities) = self.snapshot.read().await.slot(kind).clone() {
                return Ok(entities);
            }
        }

        let payload = self
            .rpc
            .call(kind.list_method(), Params::new())
            .await
            .map_err(|err| {
                warn!(kind = %kind, error = %err, "directory: refresh failed, keeping cached copy");
                err
            })?;
        let entities = Arc::new(parse_collection(kind, payload)?);

        *self.snapshot.write().await.slot_mut(kind) = Some(Arc::clone(&entities));
        debug!(kind = %kind, count = entities.len(), "directory: collection refreshed");
        Ok(entities)
    }

    pub async fn find_by_name(&self, kind: EntityKind, name: &str) -> ClientResult<Option<Entity>> {
        let found = self
            .list(kind)
            .await?
            .iter()
            .find(|entity| entity.name == name)
            .cloned();
        if found.is_none() {
            warn!(kind = %kind, name, "directory: entity not found by name");
        }
        Ok(found)
    }

    pub async fn find_by_id(&self, kind: EntityKind, id: &str) -> ClientResult<Option<Entity>> {
        let found = self
            .list(kind)
            .await?
            .iter()
            .find(|entity| entity.id == id)
            .cloned();
        if found.is_none() {
            warn!(kind = %kind, id, "directory: entity not found by id");
        }
        Ok(found)
    }

    /// Existence probe without the not-found diagnostic.
    pub async fn contains_name(&self, kind: EntityKind, name: &str) -> ClientResult<bool> {
        Ok(self
            .list(kind)
            .await?
            .iter()
            .any(|entity| entity.name == name))
    }

    pub async fn seed(&self, kind: EntityKind, entities: Vec<Entity>) {
        *self.snapshot.write().await.slot_mut(kind) = Some(Arc::new(entities));
    }

    pub async fn seed_dm_sessions(&self, sessions: Vec<DirectMessageSession>) {
        self.snapshot.write().await.dm_sessions = Some(Arc::new(sessions));
    }

    /// Commits whatever collections the session start payload carried, one
    /// collection at a time.
    pub async fn seed_from_session(&self, session: &RealtimeSessionStart) {
        let seeded = [
            (EntityKind::Channel, &session.channels),
            (EntityKind::User, &session.users),
            (EntityKind::Group, &session.groups),
        ];
        for (kind, entities) in seeded {
            if let Some(entities) = entities {
                self.seed(kind, entities.clone()).await;
            }
        }
        if let Some(sessions) = &session.ims {
            self.seed_dm_sessions(sessions.clone()).await;
        }
    }

    pub async fn invalidate(&self, kind: EntityKind) {
        *self.snapshot.write().await.slot_mut(kind) = None;
    }

    pub async fn invalidate_all(&self) {
        *self.snapshot.write().await = Snapshot::default();
    }

    /// Known DM sessions. These are never bulk-fetched: they come from the
    /// session start payload and from sessions opened by this client.
    pub async fn dm_sessions(&self) -> Arc<Vec<DirectMessageSession>> {
        self.snapshot
            .read()
            .await
            .dm_sessions
            .clone()
            .unwrap_or_default()
    }

    pub async fn find_dm_session(&self, user_id: &str) -> Option<DirectMessageSession> {
        self.snapshot
            .read()
            .await
            .dm_sessions
            .as_ref()
            .and_then(|sessions| sessions.iter().find(|session| session.user == user_id))
            .cloned()
    }

    pub async fn remember_dm_session(&self, session: DirectMessageSession) {
        let mut snapshot = self.snapshot.write().await;
        let mut sessions: Vec<DirectMessageSession> = snapshot
            .dm_sessions
            .as_deref()
            .cloned()
            .unwrap_or_default();
        sessions.retain(|existing| existing.user != session.user);
        sessions.push(session);
        snapshot.dm_sessions = Some(Arc::new(sessions));
    }
}

fn parse_collection(kind: EntityKind, mut payload: RpcPayload) -> ClientResult<Vec<Entity>> {
    let method = kind.list_method();
    let field = kind.list_field();
    let Some(value) = payload.remove(field) else {
        warn!(kind = %kind, field, "directory: list response missing collection field");
        return Err(ClientError::decode(method, format!("missing `{field}` field")));
    };
    serde_json::from_value(value).map_err(|err| {
        warn!(kind = %kind, error = %err, "directory: list response has unexpected shape");
        ClientError::decode(method, err)
    })
}
