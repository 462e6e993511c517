use std::sync::Arc;

use shared::{
    domain::EntityKind,
    error::ClientResult,
    protocol::{BotEvent, Params, RpcPayload},
};
use tokio::sync::broadcast;

pub mod config;
pub mod connection;
pub mod directory;
pub mod poster;
pub mod resolver;
pub mod rpc;
pub mod socket;

pub use config::{BotConfig, SocketOptions};
pub use connection::{ConnectionManager, ConnectionPhase};
pub use directory::Directory;
pub use poster::{MessageOptions, MessagePoster};
pub use resolver::Resolver;
pub use rpc::{HttpRemoteProcedureClient, RemoteProcedureClient};
pub use socket::{
    RealtimeSocket, SocketConnection, SocketConnector, SocketEvent, TungsteniteConnector,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Bot client context: owns the directory, the realtime connection and the
/// event channel for one set of credentials.
pub struct BotClient {
    rpc: Arc<dyn RemoteProcedureClient>,
    directory: Arc<Directory>,
    resolver: Arc<Resolver>,
    poster: MessagePoster,
    connection: ConnectionManager,
    events: broadcast::Sender<BotEvent>,
}

impl BotClient {
    /// Client talking HTTP to `config.api_base_url` and WebSocket to the
    /// session URL handed out at login.
    pub fn new(config: BotConfig) -> anyhow::Result<Self> {
        let rpc = Arc::new(HttpRemoteProcedureClient::new(
            &config.api_base_url,
            config.token.clone(),
        )?);
        Ok(Self::new_with_dependencies(
            config,
            rpc,
            Arc::new(TungsteniteConnector),
        ))
    }

    pub fn new_with_dependencies(
        config: BotConfig,
        rpc: Arc<dyn RemoteProcedureClient>,
        connector: Arc<dyn SocketConnector>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let directory = Arc::new(Directory::new(Arc::clone(&rpc), config.cached));
        let resolver = Arc::new(Resolver::new(Arc::clone(&directory), Arc::clone(&rpc)));
        let poster = MessagePoster::new(Arc::clone(&rpc), Arc::clone(&resolver), config.name);
        let connection = ConnectionManager::new(
            Arc::clone(&rpc),
            connector,
            Arc::clone(&directory),
            config.socket,
            config.prefer_advertised_reconnect_url,
            events.clone(),
        );
        Self {
            rpc,
            directory,
            resolver,
            poster,
            connection,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BotEvent> {
        self.events.subscribe()
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn poster(&self) -> &MessagePoster {
        &self.poster
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn set_cached(&self, cached: bool) {
        self.directory.set_cached(cached);
    }

    /// Raw remote call with this client's credentials.
    pub async fn call(&self, method: &str, params: Params) -> ClientResult<RpcPayload> {
        self.rpc.call(method, params).await
    }

    pub async fn login(&self) -> ClientResult<()> {
        self.connection.login().await
    }

    pub async fn logout(&self) {
        self.connection.logout().await
    }

    pub async fn connect(&self) -> ClientResult<()> {
        self.connection.connect().await
    }

    pub async fn reconnect(&self, url_override: Option<&str>) -> ClientResult<()> {
        self.connection.reconnect(url_override).await
    }

    pub async fn post_message(
        &self,
        destination_id: &str,
        text: &str,
        options: MessageOptions,
    ) -> ClientResult<RpcPayload> {
        self.poster.send(destination_id, text, options).await
    }

    pub async fn update_message(
        &self,
        destination_id: &str,
        ts: &str,
        text: &str,
        options: MessageOptions,
    ) -> ClientResult<RpcPayload> {
        self.poster.update(destination_id, ts, text, options).await
    }

    pub async fn post_to_channel(
        &self,
        name: &str,
        text: &str,
        options: MessageOptions,
    ) -> ClientResult<RpcPayload> {
        self.poster
            .send_to_named(EntityKind::Channel, name, text, options)
            .await
    }

    pub async fn post_to_group(
        &self,
        name: &str,
        text: &str,
        options: MessageOptions,
    ) -> ClientResult<RpcPayload> {
        self.poster
            .send_to_named(EntityKind::Group, name, text, options)
            .await
    }

    pub async fn post_to_user(
        &self,
        name: &str,
        text: &str,
        options: MessageOptions,
    ) -> ClientResult<RpcPayload> {
        self.poster
            .send_to_named(EntityKind::User, name, text, options)
            .await
    }

    pub async fn post_to(
        &self,
        name: &str,
        text: &str,
        options: MessageOptions,
    ) -> ClientResult<RpcPayload> {
        self.poster.send_to_inferred(name, text, options).await
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod directory_tests;

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod resolver_tests;

#[cfg(test)]
#[path = "tests/poster_tests.rs"]
mod poster_tests;

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod connection_tests;

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod rpc_tests;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
