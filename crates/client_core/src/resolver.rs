use std::sync::Arc;

use shared::{
    domain::{DirectMessageSession, EntityKind},
    error::ClientResult,
    protocol::{OpenDmResponse, Params, IM_OPEN},
};
use tracing::{debug, info};

use crate::{
    directory::Directory,
    rpc::{decode_payload, RemoteProcedureClient},
};

/// Turns human-readable destination names into routable ids.
pub struct Resolver {
    directory: Arc<Directory>,
    rpc: Arc<dyn RemoteProcedureClient>,
}

impl Resolver {
    pub fn new(directory: Arc<Directory>, rpc: Arc<dyn RemoteProcedureClient>) -> Self {
        Self { directory, rpc }
    }

    pub async fn id_for(&self, kind: EntityKind, name: &str) -> ClientResult<Option<String>> {
        Ok(self
            .directory
            .find_by_name(kind, name)
            .await?
            .map(|entity| entity.id))
    }

    /// DM session id for the user called `name`, opening a session when none
    /// is known yet. Opened sessions are remembered, so each user costs at
    /// most one open call.
    pub async fn chat_id_for(&self, name: &str) -> ClientResult<Option<String>> {
        let Some(user) = self.directory.find_by_name(EntityKind::User, name).await? else {
            return Ok(None);
        };
        if let Some(session) = self.directory.find_dm_session(&user.id).await {
            return Ok(Some(session.id));
        }
        self.open_dm(&user.id).await.map(Some)
    }

    pub async fn open_dm(&self, user_id: &str) -> ClientResult<String> {
        let payload = self
            .rpc
            .call(IM_OPEN, Params::new().with("user", user_id))
            .await?;
        let opened: OpenDmResponse = decode_payload(IM_OPEN, payload)?;
        info!(user_id, session_id = %opened.channel.id, "resolver: opened dm session");
        self.directory
            .remember_dm_session(DirectMessageSession::new(opened.channel.id.clone(), user_id))
            .await;
        Ok(opened.channel.id)
    }

    /// Probes channels, then users, then groups and returns the first kind
    /// holding `name`. The probe order is the tie-break for names present in
    /// several collections.
    pub async fn infer_kind(&self, name: &str) -> ClientResult<Option<EntityKind>> {
        for kind in EntityKind::PROBE_ORDER {
            if self.directory.contains_name(kind, name).await? {
                debug!(name, kind = %kind, "resolver: inferred destination kind");
                return Ok(Some(kind));
            }
        }
        debug!(name, "resolver: name matches no collection");
        Ok(None)
    }
}
