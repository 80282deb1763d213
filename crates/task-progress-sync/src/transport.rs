//! Socket transport.
//!
//! A [`Transport`] dials a URL and hands back a [`Socket`]: a pair of
//! channels carrying [`Frame`]s. The connection layer never touches the
//! WebSocket library directly, so tests can substitute a scripted transport.

use crate::SyncResult;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close frame without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Frame exchanged with a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
}

/// Client side of an established socket.
///
/// Sending [`Frame::Close`] on `outbound` starts the closing handshake.
/// The inbound side yields the peer's frames and ends after a close.
#[derive(Debug)]
pub struct Socket {
    pub outbound: mpsc::Sender<Frame>,
    pub inbound: mpsc::Receiver<Frame>,
}

/// Far side of a [`Socket`], held by whoever drives the wire.
#[derive(Debug)]
pub struct PeerEnd {
    /// Frames the client sent.
    pub from_client: mpsc::Receiver<Frame>,
    /// Frames to deliver to the client.
    pub to_client: mpsc::Sender<Frame>,
}

impl Socket {
    /// Create a connected socket/peer pair with the given channel buffer.
    pub fn channel(buffer: usize) -> (Socket, PeerEnd) {
        let (outbound, from_client) = mpsc::channel(buffer);
        let (to_client, inbound) = mpsc::channel(buffer);
        (
            Socket { outbound, inbound },
            PeerEnd {
                from_client,
                to_client,
            },
        )
    }
}

/// Produces sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a socket to `url`. Returns once the handshake completed.
    async fn dial(&self, url: &str) -> SyncResult<Socket>;
}

/// WebSocket transport over tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct TungsteniteTransport {
    buffer: usize,
}

impl Default for TungsteniteTransport {
    fn default() -> Self {
        Self { buffer: 100 }
    }
}

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn dial(&self, url: &str) -> SyncResult<Socket> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();
        let (socket, peer) = Socket::channel(self.buffer);
        let PeerEnd {
            mut from_client,
            to_client,
        } = peer;

        // Writer: client frames onto the wire
        tokio::spawn(async move {
            while let Some(frame) = from_client.recv().await {
                let (message, closing) = match frame {
                    Frame::Text(text) => (Message::Text(text.into()), false),
                    Frame::Close { code, reason } => (
                        Message::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        })),
                        true,
                    ),
                };
                if let Err(e) = write.send(message).await {
                    debug!(error = %e, "WebSocket write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        // Reader: wire frames to the client, always ending with a close
        tokio::spawn(async move {
            let close = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if to_client.send(Frame::Text(text.to_string())).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => Frame::Close {
                                code: u16::from(frame.code),
                                reason: frame.reason.to_string(),
                            },
                            None => Frame::Close {
                                code: CLOSE_NO_STATUS,
                                reason: String::new(),
                            },
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket read failed");
                        break Frame::Close {
                            code: CLOSE_ABNORMAL,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        break Frame::Close {
                            code: CLOSE_ABNORMAL,
                            reason: "stream ended".to_string(),
                        };
                    }
                }
            };
            let _ = to_client.send(close).await;
        });

        Ok(socket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_socket_channel_pairs_ends() {
        let (mut socket, mut peer) = Socket::channel(4);

        socket
            .outbound
            .send(Frame::Text(r#"{"type":"ping"}"#.to_string()))
            .await
            .unwrap();
        assert_eq!(
            peer.from_client.recv().await,
            Some(Frame::Text(r#"{"type":"ping"}"#.to_string()))
        );

        peer.to_client
            .send(Frame::Close {
                code: 4001,
                reason: "Unauthorized".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            socket.inbound.recv().await,
            Some(Frame::Close {
                code: 4001,
                reason: "Unauthorized".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Nothing listens on port 1
        let transport = TungsteniteTransport::new();
        assert!(transport.dial("ws://127.0.0.1:1/api/v1/ws/tasks/p").await.is_err());
    }
}
