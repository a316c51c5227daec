//! Transport abstraction
//!
//! The client never touches sockets directly. A [`Transport`] opens a
//! [`Connection`], which is split into a write half ([`FrameSink`]) and a
//! stream of inbound [`Frame`]s so the reader task and the senders can work
//! at the same time. [`WsTransport`] is the tokio-tungstenite implementation.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, SplitSink};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::error::ClientResult;

/// WebSocket close code for a normal closure
pub const NORMAL_CLOSURE: u16 = 1000;

/// Reason attached to a close frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code
    pub code: u16,
    /// Human-readable reason
    pub reason: String,
}

impl CloseReason {
    /// Normal closure (1000) with the given reason text
    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: NORMAL_CLOSURE,
            reason: reason.into(),
        }
    }
}

/// One inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text frame carrying one JSON envelope
    Text(String),
    /// Close control frame
    Close(Option<CloseReason>),
    /// Binary, ping, pong and anything else the client ignores
    Other,
}

/// Write half of a connection
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> ClientResult<()>;

    /// Send a close frame and shut the write half down
    async fn close(&mut self, reason: CloseReason) -> ClientResult<()>;
}

/// Inbound half of a connection
pub type FrameStream = BoxStream<'static, ClientResult<Frame>>;

/// A freshly opened connection
pub struct Connection {
    /// Write half
    pub sink: Box<dyn FrameSink>,
    /// Read half, ends when the peer goes away
    pub frames: FrameStream,
}

impl Connection {
    /// Bundle a sink and a frame stream
    pub fn new(sink: Box<dyn FrameSink>, frames: FrameStream) -> Self {
        Self { sink, frames }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Something that can open connections to a URL
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection; no timeout beyond the implementation's own
    async fn connect(&self, url: &Url) -> ClientResult<Connection>;
}

/// tokio-tungstenite transport
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create the transport
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &Url) -> ClientResult<Connection> {
        let (ws_stream, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        debug!("WebSocket handshake completed with status {}", response.status());

        let (ws_sender, ws_receiver) = ws_stream.split();
        let frames = ws_receiver
            .map(|msg_result| -> ClientResult<Frame> { Ok(frame_from_message(msg_result?)) })
            .boxed();

        Ok(Connection::new(Box::new(WsSink { inner: ws_sender }), frames))
    }
}

type WsWriteHalf = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Write half of a tungstenite socket
struct WsSink {
    inner: WsWriteHalf,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> ClientResult<()> {
        self.inner.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self, reason: CloseReason) -> ClientResult<()> {
        let frame = CloseFrame {
            code: CloseCode::from(reason.code),
            reason: reason.reason.into(),
        };
        self.inner.send(Message::Close(Some(frame))).await?;
        self.inner.close().await?;
        Ok(())
    }
}

/// Map a tungstenite message to a client frame
fn frame_from_message(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => Frame::Text(text.to_string()),
        Message::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
            code: u16::from(f.code),
            reason: f.reason.to_string(),
        })),
        // Pong is handled automatically by tungstenite
        _ => Frame::Other,
    }
}
