//! WebSocket front end for the session core.
//!
//! One JSON message loop per connection. Output relays run as their own
//! tasks and share the connection's outbound queue, so a subscription tail
//! never blocks request handling on the same socket.

use futures_util::{SinkExt, StreamExt};
use opsdeck_core::{
    ClientMessage, DeckError, DeckResult, RelayEvent, ServerMessage, SessionHost, ShutdownOutcome,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outbound queue depth per connection.
const OUTBOUND_CAPACITY: usize = 64;

pub struct DeckServer {
    host: Arc<SessionHost>,
    shutdown: CancellationToken,
}

impl DeckServer {
    pub fn new(host: Arc<SessionHost>) -> Self {
        Self {
            host,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that fires when a client requests a forced shutdown. The main
    /// task watches it and exits the process.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept WebSocket connections until the process exits.
    pub async fn run(&self, addr: SocketAddr) -> DeckResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DeckError::Transport(format!("bind failed: {e}")))?;
        info!(addr = %addr, "WebSocket listener started");

        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    let host = self.host.clone();
                    let shutdown = self.shutdown.clone();
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws) => {
                                debug!(remote = %remote, "connection accepted");
                                if let Err(e) = handle_connection(ws, host, shutdown).await {
                                    debug!(remote = %remote, error = %e, "connection closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %remote, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    }
}

async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<TcpStream>,
    host: Arc<SessionHost>,
    shutdown: CancellationToken,
) -> DeckResult<()> {
    let (sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);

    // Single writer per connection; relays and request handling feed it.
    let writer = tokio::spawn(async move {
        let mut sink = sink;
        while let Some(msg) = out_rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| DeckError::Transport(format!("recv failed: {e}")))?;
        match frame {
            Message::Text(text) => {
                let msg: ClientMessage = match serde_json::from_str(text.as_ref()) {
                    Ok(msg) => msg,
                    Err(e) => {
                        let _ = out_tx
                            .send(ServerMessage::Error {
                                message: format!("invalid message: {e}"),
                            })
                            .await;
                        continue;
                    }
                };
                dispatch(msg, &host, &out_tx, &shutdown).await;
            }
            Message::Close(_) => break,
            // tungstenite answers pings on its own; binary frames are not
            // part of the protocol.
            _ => {}
        }
    }

    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

async fn dispatch(
    msg: ClientMessage,
    host: &Arc<SessionHost>,
    out_tx: &mpsc::Sender<ServerMessage>,
    shutdown: &CancellationToken,
) {
    match msg {
        ClientMessage::Subscribe(session_id) => match host.subscribe(&session_id).await {
            Ok(mut sub) => {
                let out = out_tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = sub.next().await {
                        let outbound = match event {
                            RelayEvent::Output(chunk) => {
                                ServerMessage::Output(String::from_utf8_lossy(&chunk).into_owned())
                            }
                            RelayEvent::Ended => {
                                let _ = out.send(ServerMessage::SessionEnded(session_id)).await;
                                break;
                            }
                        };
                        if out.send(outbound).await.is_err() {
                            break;
                        }
                    }
                });
            }
            Err(e) => send_error(out_tx, e).await,
        },
        ClientMessage::Launch { program, language } => {
            match host.launch(&program, language.as_deref()).await {
                Ok(session) => {
                    let _ = out_tx.send(ServerMessage::Launched { session }).await;
                }
                Err(e) => send_error(out_tx, e).await,
            }
        }
        ClientMessage::Input { session, data } => match host.send_input(&session, &data).await {
            Ok(()) => {
                let _ = out_tx.send(ServerMessage::InputAck { session }).await;
            }
            Err(e) => send_error(out_tx, e).await,
        },
        ClientMessage::Stop(session_id) => match host.stop(&session_id).await {
            Ok(()) => {
                let _ = out_tx
                    .send(ServerMessage::Stopped {
                        session: session_id,
                    })
                    .await;
            }
            Err(e) => send_error(out_tx, e).await,
        },
        ClientMessage::ListSessions => {
            let _ = out_tx
                .send(ServerMessage::Sessions(host.list_active().await))
                .await;
        }
        ClientMessage::ListPrograms => {
            let _ = out_tx
                .send(ServerMessage::Programs(host.catalog().all()))
                .await;
        }
        ClientMessage::Shutdown { force } => match host.shutdown_all(force).await {
            ShutdownOutcome::Active(active) => {
                let _ = out_tx.send(ServerMessage::ShutdownPending { active }).await;
            }
            ShutdownOutcome::Terminated => {
                let _ = out_tx.send(ServerMessage::ShuttingDown).await;
                shutdown.cancel();
            }
        },
    }
}

async fn send_error(out_tx: &mpsc::Sender<ServerMessage>, e: DeckError) {
    let _ = out_tx
        .send(ServerMessage::Error {
            message: e.to_string(),
        })
        .await;
}
