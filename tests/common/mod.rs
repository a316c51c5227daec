//! Scripted in-memory transport for client tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use url::Url;

use chat_client_v1::{
    ChatClient, ClientConfig, ClientError, ClientResult, CloseReason, Connection, Frame,
    FrameSink, Transport,
};

/// What the next connect attempt does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Refuse,
    Accept,
    /// Never completes
    Hang,
    /// Accepts once the gate is opened
    Gated,
}

/// Server side of one accepted connection
#[derive(Clone)]
pub struct ServerHandle {
    frames: mpsc::UnboundedSender<ClientResult<Frame>>,
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<Mutex<Vec<CloseReason>>>,
    fail_sends: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Push a raw text frame to the client
    pub fn push_text(&self, text: &str) {
        let _ = self.frames.send(Ok(Frame::Text(text.to_string())));
    }

    /// Push an envelope built from its parts
    pub fn push_envelope(&self, kind: &str, body: &str, additional_info: Option<&str>) {
        self.push_text(&envelope_json(kind, body, additional_info));
    }

    /// Push a close frame
    pub fn push_close(&self) {
        let _ = self.frames.send(Ok(Frame::Close(Some(CloseReason::normal("server bye")))));
    }

    /// Push a transport error
    pub fn push_error(&self, reason: &str) {
        let _ = self.frames.send(Err(ClientError::Transport(reason.to_string())));
    }

    /// Make every following send fail
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Text frames the client sent
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Close frames the client sent
    pub fn closes(&self) -> Vec<CloseReason> {
        self.closes.lock().unwrap().clone()
    }
}

struct RecordingSink {
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<Mutex<Vec<CloseReason>>>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_text(&mut self, text: String) -> ClientResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("broken pipe".to_string()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self, reason: CloseReason) -> ClientResult<()> {
        self.closes.lock().unwrap().push(reason);
        Ok(())
    }
}

#[derive(Default)]
struct Script {
    plans: VecDeque<Plan>,
    attempts: Vec<(Instant, Url)>,
    servers: Vec<ServerHandle>,
}

/// Transport that follows a list of plans, refusing once they run out
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    gate: Notify,
}

impl ScriptedTransport {
    pub fn new(plans: impl IntoIterator<Item = Plan>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Script {
                plans: plans.into_iter().collect(),
                ..Script::default()
            }),
            gate: Notify::new(),
        })
    }

    /// Let a pending or future `Plan::Gated` connect complete
    pub fn open_gate(&self) {
        self.gate.notify_one();
    }

    /// Time and URL of every connect attempt
    pub fn attempts(&self) -> Vec<(Instant, Url)> {
        self.script.lock().unwrap().attempts.clone()
    }

    /// Server side of the n-th accepted connection
    pub fn server(&self, n: usize) -> ServerHandle {
        self.script.lock().unwrap().servers[n].clone()
    }

    /// Number of accepted connections
    pub fn accepted(&self) -> usize {
        self.script.lock().unwrap().servers.len()
    }
}

impl ScriptedTransport {
    fn accept(&self) -> Connection {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let server = ServerHandle {
            frames: frames_tx,
            sent: Arc::default(),
            closes: Arc::default(),
            fail_sends: Arc::default(),
        };
        let sink = RecordingSink {
            sent: Arc::clone(&server.sent),
            closes: Arc::clone(&server.closes),
            fail_sends: Arc::clone(&server.fail_sends),
        };
        self.script.lock().unwrap().servers.push(server);

        let frames = stream::unfold(frames_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        })
        .boxed();
        Connection::new(Box::new(sink), frames)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, url: &Url) -> ClientResult<Connection> {
        let plan = {
            let mut script = self.script.lock().unwrap();
            script.attempts.push((Instant::now(), url.clone()));
            script.plans.pop_front().unwrap_or(Plan::Refuse)
        };

        match plan {
            Plan::Refuse => Err(ClientError::Transport("connection refused".to_string())),
            Plan::Accept => Ok(self.accept()),
            Plan::Hang => std::future::pending().await,
            Plan::Gated => {
                self.gate.notified().await;
                Ok(self.accept())
            }
        }
    }
}

/// Client over a scripted transport
pub fn client(transport: &Arc<ScriptedTransport>) -> Arc<ChatClient> {
    let transport: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
    Arc::new(ChatClient::new(
        ClientConfig::new("ws://chat.test"),
        transport,
    ))
}

/// Inbound envelope JSON as the server would send it
pub fn envelope_json(kind: &str, body: &str, additional_info: Option<&str>) -> String {
    let info = additional_info
        .map(|info| format!(r#","additionalInfo":{}"#, info))
        .unwrap_or_default();
    format!(
        r#"{{"id":"srv-1","type":"{}","message":"{}","timestamp":"2024-05-01T12:00:00Z","user":{{"id":"u2","name":"Bob"}}{}}}"#,
        kind, body, info
    )
}
