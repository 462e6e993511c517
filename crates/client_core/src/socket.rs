use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use shared::protocol::RawFrame;
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        handshake::client::Request,
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderName, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;
use url::Url;

use crate::config::SocketOptions;

/// Close code reported when the stream ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported for a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport-level notification from a realtime socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Close { code: u16, message: String },
    Error(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Message(RawFrame),
}

#[async_trait]
pub trait RealtimeSocket: Send + Sync {
    /// Closes the socket immediately. No further events are delivered.
    async fn terminate(&self);
}

/// A freshly opened socket and the receiving end of its event stream.
///
/// The stream always starts with [`SocketEvent::Open`].
pub struct SocketConnection {
    pub socket: Arc<dyn RealtimeSocket>,
    pub events: mpsc::UnboundedReceiver<SocketEvent>,
}

#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, url: &str, options: &SocketOptions) -> Result<SocketConnection>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TungsteniteConnector;

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &str, options: &SocketOptions) -> Result<SocketConnection> {
        let parsed = Url::parse(url).with_context(|| format!("invalid websocket url: {url}"))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(anyhow!("websocket url must start with ws:// or wss://"));
        }

        let request = build_request(url, options)?;
        let handshake_timeout = Duration::from_millis(options.handshake_timeout_ms);
        let (ws_stream, _) = tokio::time::timeout(handshake_timeout, connect_async(request))
            .await
            .map_err(|_| anyhow!("websocket handshake timed out after {handshake_timeout:?}"))?
            .with_context(|| format!("failed to connect websocket: {url}"))?;
        let (writer, reader) = ws_stream.split();

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(SocketEvent::Open);
        let reader_task = tokio::spawn(pump_frames(reader, tx));

        Ok(SocketConnection {
            socket: Arc::new(TungsteniteSocket {
                writer: Mutex::new(Some(writer)),
                reader_task,
            }),
            events: rx,
        })
    }
}

fn build_request(url: &str, options: &SocketOptions) -> Result<Request> {
    let mut request = url
        .into_client_request()
        .with_context(|| format!("invalid websocket request: {url}"))?;
    let headers = request.headers_mut();
    if !options.protocols.is_empty() {
        headers.insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_str(&options.protocols.join(", "))
                .context("invalid websocket sub-protocol")?,
        );
    }
    for (name, value) in &options.headers {
        headers.insert(
            HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid websocket header name: {name}"))?,
            HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for websocket header {name}"))?,
        );
    }
    Ok(request)
}

async fn pump_frames(
    mut reader: futures::stream::SplitStream<WsStream>,
    tx: mpsc::UnboundedSender<SocketEvent>,
) {
    while let Some(frame) = reader.next().await {
        let event = match frame {
            Ok(Message::Text(text)) => SocketEvent::Message(RawFrame::Text(text)),
            Ok(Message::Binary(bytes)) => SocketEvent::Message(RawFrame::Binary(bytes)),
            Ok(Message::Ping(data)) => SocketEvent::Ping(data),
            Ok(Message::Pong(data)) => SocketEvent::Pong(data),
            Ok(Message::Close(frame)) => {
                let (code, message) = frame
                    .map(|frame| (u16::from(frame.code), frame.reason.into_owned()))
                    .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                let _ = tx.send(SocketEvent::Close { code, message });
                return;
            }
            Ok(Message::Frame(_)) => continue,
            Err(err) => {
                let _ = tx.send(SocketEvent::Error(err.to_string()));
                break;
            }
        };
        if tx.send(event).is_err() {
            return;
        }
    }
    let _ = tx.send(SocketEvent::Close {
        code: ABNORMAL_CLOSURE,
        message: String::new(),
    });
}

struct TungsteniteSocket {
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    reader_task: JoinHandle<()>,
}

#[async_trait]
impl RealtimeSocket for TungsteniteSocket {
    async fn terminate(&self) {
        self.reader_task.abort();
        let Some(mut writer) = self.writer.lock().await.take() else {
            return;
        };
        if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, writer.close())
            .await
            .is_err()
        {
            debug!("realtime: close handshake timed out, dropping socket");
        }
    }
}
