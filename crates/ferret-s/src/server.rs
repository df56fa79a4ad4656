//! WebSocket gateway. A client starts a session and immediately gets its
//! id back; everything after that is an asynchronous stream of progress
//! updates ending in exactly one terminal status plus a trailing
//! `completed` notice.

use std::net::SocketAddr;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ferret_engine::observer::{ChannelObserver, ProgressEvent, SessionStatus};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

use crate::launcher::SessionLauncher;
use crate::registry::SessionRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Start { goal: String, url: String },
    Cancel { session_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Session {
        session_id: String,
    },
    Update {
        session_id: String,
        status: SessionStatus,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screenshot_b64: Option<String>,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    fn update(session_id: &str, event: ProgressEvent) -> Self {
        ServerMessage::Update {
            session_id: session_id.to_string(),
            status: event.status,
            message: event.message,
            step_id: event.step_id,
            screenshot_b64: event.screenshot.map(|png| BASE64.encode(png)),
        }
    }
}

pub struct Gateway {
    registry: Arc<SessionRegistry>,
    launcher: Arc<dyn SessionLauncher>,
}

pub struct GatewayHandle {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl GatewayHandle {
    /// Block until the accept loop ends (it normally never does).
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

impl Gateway {
    pub fn new(launcher: Arc<dyn SessionLauncher>) -> Self {
        Gateway {
            registry: Arc::new(SessionRegistry::new()),
            launcher,
        }
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Bind and spawn the accept loop; port 0 picks a free port.
    pub async fn serve(self: Arc<Self>, port: u16) -> std::io::Result<GatewayHandle> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(&addr).await?;
        let addr = listener.local_addr()?;
        info!("Session gateway listening on: {}", addr);

        let gateway = Arc::clone(&self);
        let task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                info!("Accepted TCP connection from: {}", peer);
                let gateway = Arc::clone(&gateway);
                tokio::spawn(async move { gateway.handle_connection(stream).await });
            }
        });

        Ok(GatewayHandle { addr, task })
    }

    async fn handle_connection(&self, stream: TcpStream) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("Error during the websocket handshake occurred: {}", e);
                return;
            }
        };
        debug!("WebSocket handshake successful");
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // All outgoing traffic funnels through one writer task so session
        // event forwarders never contend for the sink.
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_sender.send(Message::Text(json)).await {
                    debug!("Client write failed, dropping connection: {}", e);
                    break;
                }
            }
        });

        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Start { goal, url }) => {
                        self.start_session(goal, url, &out_tx).await;
                    }
                    Ok(ClientMessage::Cancel { session_id }) => {
                        if self.registry.cancel(&session_id) {
                            info!("Cancellation requested for {}", session_id);
                        } else {
                            let _ = out_tx.send(ServerMessage::Error {
                                message: format!("unknown session: {session_id}"),
                            });
                        }
                    }
                    Err(e) => {
                        let _ = out_tx.send(ServerMessage::Error {
                            message: format!("unrecognized message: {e}"),
                        });
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("WebSocket closed by client");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        // Running sessions keep their forwarder alive; the writer ends
        // once every sender is gone.
        drop(out_tx);
        let _ = writer.await;
    }

    async fn start_session(
        &self,
        goal: String,
        url: String,
        out_tx: &mpsc::UnboundedSender<ServerMessage>,
    ) {
        let (observer, mut events) = ChannelObserver::new();
        match self.launcher.launch(&goal, &url, Arc::new(observer)).await {
            Ok(cancel) => {
                let session_id = self.registry.create(cancel);
                info!("Started {} for goal: {}", session_id, goal);
                let _ = out_tx.send(ServerMessage::Session {
                    session_id: session_id.clone(),
                });

                let registry = Arc::clone(&self.registry);
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        let last = event.status == SessionStatus::Completed;
                        let _ = out_tx.send(ServerMessage::update(&session_id, event));
                        if last {
                            registry.destroy(&session_id);
                            break;
                        }
                    }
                });
            }
            Err(e) => {
                error!("Failed to start session: {}", e);
                let _ = out_tx.send(ServerMessage::Error {
                    message: format!("failed to start session: {e}"),
                });
            }
        }
    }
}
