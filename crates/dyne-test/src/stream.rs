//! In-memory stream client.

use std::time::Duration;

use dyne_server::{Message, StreamAccept};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::error::TestError;

const PIPE_CAPACITY: usize = 64 * 1024;

/// How long [`TestStream::recv`] waits before giving up.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Close frame the server sent, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closed {
    /// Close code.
    pub code: u16,
    /// Close reason.
    pub reason: String,
}

/// Client end of a stream served over an in-memory pipe.
///
/// Obtained from [`TestClientRequest::connect`](crate::TestClientRequest::connect).
#[derive(Debug)]
pub struct TestStream {
    socket: WebSocketStream<DuplexStream>,
    server: JoinHandle<()>,
    shutdown: CancellationToken,
    closed: Option<Closed>,
}

impl TestStream {
    pub(crate) async fn open(accept: StreamAccept) -> Self {
        let (client_io, server_io) = tokio::io::duplex(PIPE_CAPACITY);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let server = tokio::spawn(async move {
            let ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
            accept.run(ws, &token).await;
        });
        let socket = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        Self {
            socket,
            server,
            shutdown,
            closed: None,
        }
    }

    /// Sends a text message.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), TestError> {
        self.socket
            .send(WsMessage::text(text.into()))
            .await
            .map_err(|e| TestError::Stream(e.to_string()))
    }

    /// Sends a binary message.
    pub async fn send_bytes(&mut self, data: impl Into<bytes::Bytes>) -> Result<(), TestError> {
        self.socket
            .send(WsMessage::binary(data.into()))
            .await
            .map_err(|e| TestError::Stream(e.to_string()))
    }

    /// Sends `value` as a JSON text message.
    pub async fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TestError> {
        let text = serde_json::to_string(value)?;
        self.send_text(text).await
    }

    /// Receives the next data message, or `None` once the server closed the
    /// stream.
    pub async fn recv(&mut self) -> Result<Option<Message>, TestError> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.socket.next())
                .await
                .map_err(|_| TestError::Stream("timed out waiting for a message".to_string()))?;
            match frame {
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(Message::Text(text.as_str().to_owned()))),
                Some(Ok(WsMessage::Binary(data))) => return Ok(Some(Message::Binary(data))),
                Some(Ok(WsMessage::Close(frame))) => {
                    self.closed = Some(frame.map_or(
                        Closed {
                            code: 1005,
                            reason: String::new(),
                        },
                        |f| Closed {
                            code: u16::from(f.code),
                            reason: f.reason.as_str().to_owned(),
                        },
                    ));
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TestError::Stream(e.to_string())),
                None => return Ok(None),
            }
        }
    }

    /// Receives the next message as text.
    pub async fn recv_text(&mut self) -> Result<String, TestError> {
        match self.recv().await? {
            Some(Message::Text(text)) => Ok(text),
            Some(Message::Binary(_)) => Err(TestError::BodyRead("expected text, got binary".to_string())),
            None => Err(TestError::Stream("stream closed".to_string())),
        }
    }

    /// Receives the next message and decodes it as JSON.
    pub async fn recv_json<T: DeserializeOwned>(&mut self) -> Result<T, TestError> {
        match self.recv().await? {
            Some(msg) => Ok(serde_json::from_slice(msg.as_bytes())?),
            None => Err(TestError::Stream("stream closed".to_string())),
        }
    }

    /// The close frame received from the server, once [`recv`](Self::recv)
    /// has returned `None`.
    pub fn closed(&self) -> Option<&Closed> {
        self.closed.as_ref()
    }

    /// Simulates server shutdown for this stream.
    pub fn shutdown_server(&self) {
        self.shutdown.cancel();
    }

    /// Closes the client side and waits for the server side to finish.
    pub async fn close(mut self) -> Result<(), TestError> {
        // The server may have closed first.
        let _ = self.socket.close(None).await;
        self.server.await.map_err(|e| TestError::Stream(e.to_string()))
    }
}
