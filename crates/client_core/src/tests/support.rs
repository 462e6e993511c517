use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{
    error::{ClientError, ClientResult},
    protocol::{BotEvent, Params, RpcPayload},
};
use tokio::sync::{broadcast, mpsc};

use crate::{
    config::SocketOptions,
    socket::{RealtimeSocket, SocketConnection, SocketConnector, SocketEvent},
    RemoteProcedureClient,
};

#[derive(Clone)]
enum Reply {
    Ok(Value),
    Fail(String),
}

/// Scripted remote procedure client. Replies queue per method; the last
/// queued reply keeps answering once the others are consumed.
#[derive(Default)]
pub(crate) struct FakeRpc {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Params)>>,
}

impl FakeRpc {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues `{"ok": true, ..fields}` for `method`.
    pub(crate) fn reply(&self, method: &str, fields: Value) {
        let mut body = json!({ "ok": true });
        if let (Some(object), Value::Object(fields)) = (body.as_object_mut(), fields) {
            object.extend(fields);
        }
        self.push(method, Reply::Ok(body));
    }

    pub(crate) fn fail(&self, method: &str, error: &str) {
        self.push(method, Reply::Fail(error.to_string()));
    }

    fn push(&self, method: &str, reply: Reply) {
        self.replies
            .lock()
            .expect("replies lock")
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn calls(&self) -> Vec<(String, Params)> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|(called, _)| called == method)
            .count()
    }

    pub(crate) fn last_params(&self, method: &str) -> Params {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .rev()
            .find(|(called, _)| called == method)
            .map(|(_, params)| params.clone())
            .unwrap_or_else(|| panic!("{method} was never called"))
    }
}

#[async_trait]
impl RemoteProcedureClient for FakeRpc {
    async fn call(&self, method: &str, params: Params) -> ClientResult<RpcPayload> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((method.to_string(), params));

        let reply = {
            let mut replies = self.replies.lock().expect("replies lock");
            let queue = replies.entry(method.to_string()).or_default();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };

        match reply {
            Some(Reply::Ok(Value::Object(body))) => Ok(body),
            Some(Reply::Ok(_)) => Err(ClientError::decode(
                method,
                "scripted body is not an object",
            )),
            Some(Reply::Fail(error)) => Err(ClientError::Api {
                method: method.to_string(),
                error,
            }),
            None => Err(ClientError::Api {
                method: method.to_string(),
                error: "unknown_method".to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeSocket {
    terminated: AtomicBool,
}

impl FakeSocket {
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RealtimeSocket for FakeSocket {
    async fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out in-memory sockets the test can push events into.
#[derive(Default)]
pub(crate) struct FakeConnector {
    refuse: AtomicBool,
    urls: Mutex<Vec<String>>,
    options: Mutex<Vec<SocketOptions>>,
    sockets: Mutex<Vec<(Arc<FakeSocket>, mpsc::UnboundedSender<SocketEvent>)>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().expect("urls lock").clone()
    }

    pub(crate) fn last_options(&self) -> Option<SocketOptions> {
        self.options.lock().expect("options lock").last().cloned()
    }

    pub(crate) fn socket(&self, index: usize) -> Arc<FakeSocket> {
        Arc::clone(&self.sockets.lock().expect("sockets lock")[index].0)
    }

    /// Delivers `event` on the most recently opened socket.
    pub(crate) fn push(&self, event: SocketEvent) {
        let sockets = self.sockets.lock().expect("sockets lock");
        let (_, tx) = sockets.last().expect("no socket opened");
        tx.send(event).expect("forwarder alive");
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn connect(&self, url: &str, options: &SocketOptions) -> Result<SocketConnection> {
        self.urls.lock().expect("urls lock").push(url.to_string());
        self.options
            .lock()
            .expect("options lock")
            .push(options.clone());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(SocketEvent::Open).expect("open event");
        let socket = Arc::new(FakeSocket::default());
        self.sockets
            .lock()
            .expect("sockets lock")
            .push((Arc::clone(&socket), tx));
        Ok(SocketConnection { socket, events: rx })
    }
}

pub(crate) async fn next_event(rx: &mut broadcast::Receiver<BotEvent>) -> BotEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event in time")
        .expect("event")
}

pub(crate) fn channel_list() -> Value {
    json!({
        "channels": [
            {"id": "C1", "name": "general", "is_member": true},
            {"id": "C2", "name": "random"},
            {"id": "C3", "name": "shared"}
        ]
    })
}

pub(crate) fn user_list() -> Value {
    json!({
        "members": [
            {"id": "U1", "name": "alice"},
            {"id": "U2", "name": "bob"},
            {"id": "U3", "name": "shared"}
        ]
    })
}

pub(crate) fn group_list() -> Value {
    json!({
        "groups": [
            {"id": "G1", "name": "admins"},
            {"id": "G2", "name": "bob"}
        ]
    })
}
