use std::sync::Arc;

use serde_json::Value;
use shared::{
    domain::EntityKind,
    error::{ClientError, ClientResult},
    protocol::{Params, RpcPayload, CHAT_POST_MESSAGE, CHAT_UPDATE},
};
use tracing::warn;

use crate::{resolver::Resolver, rpc::RemoteProcedureClient};

/// Caller-supplied extras for a post or update.
#[derive(Debug, Clone, Default)]
pub struct MessageOptions {
    /// Extra remote parameters (attachments, icon, threading, ...). Structured
    /// values are flattened to JSON text before transport.
    pub params: Params,
    /// Address a user by their own id instead of a DM session, which the
    /// platform delivers through its built-in assistant channel.
    pub via_slackbot: bool,
}

impl MessageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn via_slackbot(mut self) -> Self {
        self.via_slackbot = true;
        self
    }
}

pub struct MessagePoster {
    rpc: Arc<dyn RemoteProcedureClient>,
    resolver: Arc<Resolver>,
    display_name: Option<String>,
}

impl MessagePoster {
    pub fn new(
        rpc: Arc<dyn RemoteProcedureClient>,
        resolver: Arc<Resolver>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            rpc,
            resolver,
            display_name,
        }
    }

    pub async fn send(
        &self,
        destination_id: &str,
        text: &str,
        options: MessageOptions,
    ) -> ClientResult<RpcPayload> {
        let params = self.compose(options.params, destination_id, text);
        self.rpc.call(CHAT_POST_MESSAGE, params).await
    }

    pub async fn update(
        &self,
        destination_id: &str,
        ts: &str,
        text: &str,
        options: MessageOptions,
    ) -> ClientResult<RpcPayload> {
        let mut params = self.compose(options.params, destination_id, text);
        params.insert("ts", ts);
        self.rpc.call(CHAT_UPDATE, params).await
    }

    pub async fn send_to_named(
        &self,
        kind: EntityKind,
        name: &str,
        text: &str,
        options: MessageOptions,
    ) -> ClientResult<RpcPayload> {
        let destination = match kind {
            EntityKind::User if !options.via_slackbot => self.resolver.chat_id_for(name).await?,
            _ => self.resolver.id_for(kind, name).await?,
        };
        let Some(destination_id) = destination else {
            warn!(kind = %kind, name, "poster: destination unresolved, message not sent");
            return Err(ClientError::Unresolved {
                kind,
                name: name.to_string(),
            });
        };
        self.send(&destination_id, text, options).await
    }

    /// Sends to whichever collection holds `name`, treating an unknown name
    /// as a user.
    pub async fn send_to_inferred(
        &self,
        name: &str,
        text: &str,
        options: MessageOptions,
    ) -> ClientResult<RpcPayload> {
        let kind = self
            .resolver
            .infer_kind(name)
            .await?
            .unwrap_or(EntityKind::User);
        self.send_to_named(kind, name, text, options).await
    }

    fn compose(&self, mut params: Params, destination_id: &str, text: &str) -> Params {
        params.insert("text", text);
        params.insert("channel", destination_id);
        if let Some(name) = &self.display_name {
            params.insert("username", name.as_str());
        }
        params
    }
}
