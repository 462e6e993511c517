use std::sync::Arc;

use shared::{
    error::{ClientError, ClientResult},
    protocol::{BotEvent, MessageData, Params, RealtimeSessionStart, RTM_START},
};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::SocketOptions,
    directory::Directory,
    rpc::{decode_payload, RemoteProcedureClient},
    socket::{RealtimeSocket, SocketConnector, SocketEvent},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    LoggingIn,
    Connected,
}

struct ActiveSocket {
    socket: Arc<dyn RealtimeSocket>,
    forwarder: JoinHandle<()>,
}

impl ActiveSocket {
    /// Stops event delivery first so nothing from the old socket is published
    /// after this returns.
    async fn shutdown(self) {
        self.forwarder.abort();
        self.socket.terminate().await;
    }
}

struct ConnectionState {
    phase: ConnectionPhase,
    session: Option<RealtimeSessionStart>,
    session_url: Option<String>,
    reconnect_url: Option<String>,
    socket: Option<ActiveSocket>,
}

/// Owns the realtime session: login, socket lifecycle and event forwarding.
///
/// The state lock is held across socket opens, so connect, reconnect and
/// logout are serialized and at most one socket is live at a time.
pub struct ConnectionManager {
    rpc: Arc<dyn RemoteProcedureClient>,
    connector: Arc<dyn SocketConnector>,
    directory: Arc<Directory>,
    socket_options: SocketOptions,
    prefer_advertised_reconnect_url: bool,
    state: Arc<Mutex<ConnectionState>>,
    events: broadcast::Sender<BotEvent>,
}

impl ConnectionManager {
    pub fn new(
        rpc: Arc<dyn RemoteProcedureClient>,
        connector: Arc<dyn SocketConnector>,
        directory: Arc<Directory>,
        socket_options: SocketOptions,
        prefer_advertised_reconnect_url: bool,
        events: broadcast::Sender<BotEvent>,
    ) -> Self {
        Self {
            rpc,
            connector,
            directory,
            socket_options,
            prefer_advertised_reconnect_url,
            state: Arc::new(Mutex::new(ConnectionState {
                phase: ConnectionPhase::Disconnected,
                session: None,
                session_url: None,
                reconnect_url: None,
                socket: None,
            })),
            events,
        }
    }

    /// Starts a realtime session and connects its socket.
    ///
    /// A failed start call publishes nothing and restores the previous phase.
    pub async fn login(&self) -> ClientResult<()> {
        let previous_phase = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut state.phase, ConnectionPhase::LoggingIn)
        };

        let session = match self.start_session().await {
            Ok(session) => session,
            Err(err) => {
                error!(error = %err, "realtime: login failed");
                self.state.lock().await.phase = previous_phase;
                return Err(err);
            }
        };

        self.directory.seed_from_session(&session).await;
        info!(
            url = %session.url,
            user = session.self_identity.as_ref().map(|identity| identity.name.as_str()),
            "realtime: session started"
        );
        {
            let mut state = self.state.lock().await;
            state.session_url = Some(session.url.clone());
            state.session = Some(session);
            state.reconnect_url = None;
            state.phase = ConnectionPhase::Connected;
        }
        let _ = self.events.send(BotEvent::Login);

        self.connect().await
    }

    async fn start_session(&self) -> ClientResult<RealtimeSessionStart> {
        let payload = self.rpc.call(RTM_START, Params::new()).await?;
        decode_payload(RTM_START, payload)
    }

    /// Opens a socket to the session URL, replacing any socket already open.
    pub async fn connect(&self) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        let Some(url) = state.session_url.clone() else {
            error!("realtime: connect requested before login");
            return Err(ClientError::NotLoggedIn);
        };
        self.open_socket(&mut state, url).await
    }

    /// Replaces the live socket with one to `url_override`, or to the default
    /// target: the login session URL, or the last advertised reconnect URL
    /// when the client prefers it.
    pub async fn reconnect(&self, url_override: Option<&str>) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        if state.socket.is_none() {
            error!("realtime: reconnect requested but websocket not connected");
            return Err(ClientError::NotConnected);
        }

        let target = match url_override {
            Some(url) => url.to_string(),
            None => self.default_reconnect_target(&state)?,
        };
        info!(url = %target, "realtime: reconnecting");
        self.open_socket(&mut state, target).await
    }

    pub async fn logout(&self) {
        {
            let mut state = self.state.lock().await;
            match state.socket.take() {
                Some(active) => active.shutdown().await,
                None => debug!("realtime: logout without an open socket"),
            }
            state.phase = ConnectionPhase::Disconnected;
        }
        info!("realtime: logged out");
        let _ = self.events.send(BotEvent::Logout);
    }

    pub async fn phase(&self) -> ConnectionPhase {
        self.state.lock().await.phase
    }

    /// True while a socket is open and the server has not closed it.
    pub async fn is_connected(&self) -> bool {
        let state = self.state.lock().await;
        state.phase == ConnectionPhase::Connected && state.socket.is_some()
    }

    pub async fn session(&self) -> Option<RealtimeSessionStart> {
        self.state.lock().await.session.clone()
    }

    pub async fn session_url(&self) -> Option<String> {
        self.state.lock().await.session_url.clone()
    }

    pub async fn reconnect_url(&self) -> Option<String> {
        self.state.lock().await.reconnect_url.clone()
    }

    fn default_reconnect_target(&self, state: &ConnectionState) -> ClientResult<String> {
        if self.prefer_advertised_reconnect_url {
            if let Some(url) = &state.reconnect_url {
                return Ok(url.clone());
            }
        }
        state.session_url.clone().ok_or(ClientError::NotLoggedIn)
    }

    async fn open_socket(&self, state: &mut ConnectionState, url: String) -> ClientResult<()> {
        if let Some(previous) = state.socket.take() {
            previous.shutdown().await;
        }

        let connection = match self.connector.connect(&url, &self.socket_options).await {
            Ok(connection) => connection,
            Err(err) => {
                error!(%url, error = %format!("{err:#}"), "realtime: socket connect failed");
                state.phase = ConnectionPhase::Disconnected;
                let _ = self.events.send(BotEvent::SocketError {
                    error: err.to_string(),
                });
                return Err(ClientError::Socket(format!("{err:#}")));
            }
        };

        let forwarder = spawn_forwarder(
            connection.events,
            self.events.clone(),
            Arc::clone(&self.state),
        );
        state.socket = Some(ActiveSocket {
            socket: connection.socket,
            forwarder,
        });
        state.phase = ConnectionPhase::Connected;
        debug!(%url, "realtime: socket established");
        Ok(())
    }
}

/// Republishes transport events as domain events until the socket's stream
/// ends or the task is aborted.
///
/// A close, or the end of the stream, drops the phase to `Disconnected`
/// before `socket.close` is published. The socket handle stays in place so
/// `reconnect()` can still replace it.
fn spawn_forwarder(
    mut socket_events: mpsc::UnboundedReceiver<SocketEvent>,
    events: broadcast::Sender<BotEvent>,
    state: Arc<Mutex<ConnectionState>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = socket_events.recv().await {
            let event = match event {
                SocketEvent::Open => BotEvent::SocketOpen,
                SocketEvent::Close { code, message } => {
                    info!(code, %message, "realtime: socket closed");
                    state.lock().await.phase = ConnectionPhase::Disconnected;
                    BotEvent::SocketClose { code, message }
                }
                SocketEvent::Error(error) => {
                    warn!(%error, "realtime: socket error");
                    BotEvent::SocketError { error }
                }
                SocketEvent::Ping(data) => BotEvent::SocketPing { data },
                SocketEvent::Pong(data) => BotEvent::SocketPong { data },
                SocketEvent::Message(raw) => {
                    let data = MessageData::parse(&raw);
                    if matches!(data, MessageData::Opaque(_)) {
                        debug!("realtime: frame is not json, forwarding as opaque data");
                    }
                    // Experimental endpoint hint; only used by a later reconnect.
                    if let Some(url) = data.advertised_reconnect_url() {
                        debug!(%url, "realtime: reconnect url advertised");
                        state.lock().await.reconnect_url = Some(url.to_string());
                    }
                    BotEvent::SocketMessage { data, raw }
                }
            };
            let _ = events.send(event);
        }
        let mut state = state.lock().await;
        if state.phase == ConnectionPhase::Connected {
            debug!("realtime: socket event stream ended");
            state.phase = ConnectionPhase::Disconnected;
        }
    })
}
