//! Persistent bidirectional streams over WebSocket.
//!
//! An accepted stream gets two pump tasks around the socket:
//!
//! ```text
//!            ┌── reader ──► incoming ──► session.recv()
//! socket ◄───┤
//!            └── writer ◄── outgoing ◄── session.send()
//! ```
//!
//! Both pumps and the session share one cancellation token, a child of the
//! server's shutdown token. The peer disconnecting, the handler returning
//! or the server shutting down cancels it; pending `recv` calls then yield
//! `None`, pending `send` calls fail with [`StreamError::Closed`], and both
//! pumps exit. A writer stuck behind a peer that stopped reading gives up
//! on cancellation, after at most a short closing grace period.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use dyne_core::{Request, RequestState, User};
use dyne_router::{ParamValue, Params};
use dyne_telemetry::StreamGuard;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::handler::StreamHandler;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// How long a cancelled writer may spend on the closing handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// A data message on a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Bytes),
}

impl Message {
    /// The payload as bytes, whatever the frame type.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// The payload as text, for text frames.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }
}

impl From<Message> for WsMessage {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => WsMessage::text(text),
            Message::Binary(data) => WsMessage::binary(data),
        }
    }
}

enum Outbound {
    Data(Message),
    Close(u16, String),
}

/// One side of an accepted stream, handed to the stream handler.
///
/// Carries the upgrade request's parameters, state and authenticated user.
pub struct StreamSession {
    request: Request,
    incoming: mpsc::Receiver<Message>,
    outgoing: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    closed: bool,
}

impl StreamSession {
    /// Receives the next data message, or `None` once the stream is over.
    pub async fn recv(&mut self) -> Option<Message> {
        if self.closed {
            return None;
        }
        // Buffered messages are still delivered after the peer hangs up.
        tokio::select! {
            biased;
            msg = self.incoming.recv() => msg,
            () = self.cancel.cancelled() => None,
        }
    }

    /// Receives the next message and decodes it as JSON.
    pub async fn recv_json<T: DeserializeOwned>(&mut self) -> Result<T, StreamError> {
        let msg = self.recv().await.ok_or(StreamError::Closed)?;
        Ok(serde_json::from_slice(msg.as_bytes())?)
    }

    /// Sends a message, waiting for buffer space.
    pub async fn send(&self, msg: Message) -> Result<(), StreamError> {
        if self.closed || self.cancel.is_cancelled() {
            return Err(StreamError::Closed);
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(StreamError::Closed),
            sent = self.outgoing.send(Outbound::Data(msg)) => sent.map_err(|_| StreamError::Closed),
        }
    }

    /// Sends a text message.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), StreamError> {
        self.send(Message::Text(text.into())).await
    }

    /// Sends raw bytes.
    pub async fn send_bytes(&self, data: impl Into<Bytes>) -> Result<(), StreamError> {
        self.send(Message::Binary(data.into())).await
    }

    /// Sends `value` as a JSON text message.
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), StreamError> {
        self.send_text(serde_json::to_string(value)?).await
    }

    /// Closes the stream normally.
    pub async fn close(&mut self) -> Result<(), StreamError> {
        self.close_with(1000, "").await
    }

    /// Closes the stream with a close code and reason. Closing twice is a
    /// no-op.
    pub async fn close_with(&mut self, code: u16, reason: impl Into<String>) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.outgoing
            .send(Outbound::Close(code, reason.into()))
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Returns true once the session was closed or cancelled.
    pub fn is_closed(&self) -> bool {
        self.closed || self.cancel.is_cancelled()
    }

    /// Path parameters of the stream route.
    pub fn params(&self) -> &Params {
        self.request.params()
    }

    /// One path parameter.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.request.param(name)
    }

    /// Headers of the upgrade request.
    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// Request state, shared with hooks and the auth gate.
    pub fn state(&self) -> &RequestState {
        self.request.state()
    }

    /// Mutable request state.
    pub fn state_mut(&mut self) -> &mut RequestState {
        self.request.state_mut()
    }

    /// The authenticated user, on gated routes.
    pub fn user(&self) -> Option<&User> {
        self.request.user()
    }

    /// The upgrade request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Cancelled when the stream ends for any reason.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("path", &self.request.path())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// A stream request that passed routing, hooks and auth, waiting for its
/// socket.
pub struct StreamAccept {
    pub(crate) request: Request,
    pub(crate) handler: StreamHandler,
    pub(crate) capacity: usize,
}

impl StreamAccept {
    /// The matched upgrade request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Serves the stream on `ws` until it ends.
    ///
    /// Returns once the handler has returned and both pumps have exited.
    pub async fn run<S>(self, ws: WebSocketStream<S>, shutdown: &CancellationToken)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let _guard = StreamGuard::new();
        let cancel = shutdown.child_token();
        let (sink, source) = ws.split();
        let (in_tx, in_rx) = mpsc::channel(self.capacity);
        let (out_tx, out_rx) = mpsc::channel(self.capacity);

        let reader = tokio::spawn(read_pump(source, in_tx, cancel.clone()));
        let mut writer = tokio::spawn(write_pump(sink, out_rx, cancel.clone()));

        let route = self.request.route().map(|r| r.name.clone()).unwrap_or_default();
        tracing::debug!(route = %route, "stream opened");

        let session = StreamSession {
            request: self.request,
            incoming: in_rx,
            outgoing: out_tx,
            cancel: cancel.clone(),
            closed: false,
        };
        let served = AssertUnwindSafe((self.handler)(session)).catch_unwind().await;
        if served.is_err() {
            tracing::error!(route = %route, fault = "server", "stream handler panicked");
        }

        // The session is gone, so the writer drains, sends a close frame
        // and cancels the reader.
        tokio::select! {
            _ = &mut writer => {}
            () = cancel.cancelled() => {
                if tokio::time::timeout(CLOSE_GRACE * 2, &mut writer).await.is_err() {
                    tracing::warn!(route = %route, "stream writer did not stop, aborting");
                    writer.abort();
                }
            }
        }
        cancel.cancel();
        let _ = reader.await;
        tracing::debug!(route = %route, "stream closed");
    }
}

impl std::fmt::Debug for StreamAccept {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAccept")
            .field("path", &self.request.path())
            .finish_non_exhaustive()
    }
}

async fn read_pump<S>(mut source: SplitStream<WebSocketStream<S>>, tx: mpsc::Sender<Message>, cancel: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = source.next() => frame,
        };
        let msg = match frame {
            Some(Ok(WsMessage::Text(text))) => Message::Text(text.as_str().to_owned()),
            Some(Ok(WsMessage::Binary(data))) => Message::Binary(data),
            Some(Ok(WsMessage::Close(_))) | None => {
                tracing::debug!("peer closed stream");
                break;
            }
            // Control frames are answered by the protocol layer.
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "stream read failed");
                break;
            }
        };
        let delivered = tokio::select! {
            () = cancel.cancelled() => break,
            sent = tx.send(msg) => sent.is_ok(),
        };
        if !delivered {
            break;
        }
    }
    cancel.cancel();
}

async fn write_pump<S>(
    mut sink: SplitSink<WebSocketStream<S>, WsMessage>,
    mut rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = rx.recv() => next,
        };
        match next {
            Some(Outbound::Data(msg)) => {
                let sent = tokio::select! {
                    () = cancel.cancelled() => break,
                    sent = sink.send(msg.into()) => sent,
                };
                if let Err(e) = sent {
                    tracing::debug!(error = %e, "stream write failed");
                    break;
                }
            }
            Some(Outbound::Close(code, reason)) => {
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                };
                tokio::select! {
                    () = cancel.cancelled() => {}
                    _ = sink.send(WsMessage::Close(Some(frame))) => {}
                }
                break;
            }
            None => break,
        }
    }
    let closed = tokio::select! {
        () = cancel.cancelled() => false,
        _ = sink.close() => true,
    };
    if !closed {
        let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
    }
    cancel.cancel();
}

/// Returns true if the headers ask for a WebSocket upgrade.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    let websocket = headers
        .get(http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    connection_upgrade && websocket
}

/// Validates an upgrade request and derives its `Sec-WebSocket-Accept`
/// value.
pub fn accept_key(headers: &HeaderMap) -> Result<String, &'static str> {
    if !is_upgrade_request(headers) {
        return Err("missing Connection: Upgrade or Upgrade: websocket header");
    }
    if headers.get(http::header::SEC_WEBSOCKET_VERSION).and_then(|v| v.to_str().ok()) != Some("13") {
        return Err("missing or unsupported Sec-WebSocket-Version (must be 13)");
    }
    let key = headers
        .get(http::header::SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty())
        .ok_or("missing Sec-WebSocket-Key header")?;

    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    Ok(STANDARD.encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn upgrade_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, Upgrade"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert("sec-websocket-version", HeaderValue::from_static("13"));
        headers.insert("sec-websocket-key", HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="));
        headers
    }

    #[test]
    fn test_accept_key_rfc_example() {
        assert_eq!(accept_key(&upgrade_headers()).unwrap(), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_upgrade_detection() {
        let mut headers = upgrade_headers();
        assert!(is_upgrade_request(&headers));
        headers.insert("sec-websocket-version", HeaderValue::from_static("8"));
        assert!(accept_key(&headers).is_err());
        headers.remove("upgrade");
        assert!(!is_upgrade_request(&headers));
    }

    #[test]
    fn test_message_payloads() {
        let text = Message::Text("hi".to_string());
        assert_eq!(text.as_bytes(), b"hi");
        assert_eq!(text.as_text(), Some("hi"));
        assert_eq!(Message::Binary(Bytes::from_static(b"\x01")).as_text(), None);
    }
}
