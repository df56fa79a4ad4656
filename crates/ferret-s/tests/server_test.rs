use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferret_engine::agent::CancelHandle;
use ferret_engine::observer::{Observer, ProgressEvent, SessionStatus};
use ferret_s::{ClientMessage, Gateway, LaunchError, ServerMessage, SessionLauncher};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

/// Stands in for the engine: replays a short successful session, or, in
/// hang mode, emits nothing further until cancelled.
struct FakeLauncher {
    hang: bool,
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(
        &self,
        goal: &str,
        _url: &str,
        observer: Arc<dyn Observer>,
    ) -> Result<CancelHandle, LaunchError> {
        let (cancel, mut stop) = CancelHandle::pair();
        let hang = self.hang;
        let goal = goal.to_string();
        tokio::spawn(async move {
            observer
                .notify(ProgressEvent::new(
                    SessionStatus::Starting,
                    format!("Starting automation for: {goal}"),
                ))
                .await;
            if hang {
                while !*stop.borrow() {
                    if stop.changed().await.is_err() {
                        break;
                    }
                }
                observer
                    .notify(ProgressEvent::new(SessionStatus::Failed, "Session cancelled"))
                    .await;
            } else {
                observer
                    .notify(ProgressEvent::new(
                        SessionStatus::Analyzing,
                        "Cycle 1: analyzing page",
                    ))
                    .await;
                observer
                    .notify(
                        ProgressEvent::new(SessionStatus::StepSuccess, "Clicked: search")
                            .with_step("s1")
                            .with_screenshot(vec![0x89, 0x50, 0x4e, 0x47]),
                    )
                    .await;
                observer
                    .notify(ProgressEvent::new(SessionStatus::Done, "goal reached"))
                    .await;
            }
            observer
                .notify(ProgressEvent::new(
                    SessionStatus::Completed,
                    "session closed",
                ))
                .await;
        });
        Ok(cancel)
    }
}

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn start_gateway(hang: bool) -> (Arc<Gateway>, WsClient) {
    let gateway = Arc::new(Gateway::new(Arc::new(FakeLauncher { hang })));
    let handle = Arc::clone(&gateway).serve(0).await.expect("bind failed");
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{}", handle.addr))
        .await
        .expect("connect failed");
    (gateway, client)
}

async fn send(client: &mut WsClient, msg: &ClientMessage) {
    client
        .send(Message::Text(serde_json::to_string(msg).unwrap()))
        .await
        .expect("send failed");
}

async fn recv(client: &mut WsClient) -> ServerMessage {
    let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for a message")
        .expect("connection closed")
        .expect("websocket error");
    match frame {
        Message::Text(text) => serde_json::from_str(&text).expect("unparsable server message"),
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[tokio::test]
async fn start_returns_session_id_then_streams_events_in_order() {
    let (gateway, mut client) = start_gateway(false).await;

    send(
        &mut client,
        &ClientMessage::Start {
            goal: "find the pricing page".into(),
            url: "https://example.com".into(),
        },
    )
    .await;

    let session_id = match recv(&mut client).await {
        ServerMessage::Session { session_id } => session_id,
        other => panic!("expected session reply first, got {other:?}"),
    };
    assert!(session_id.starts_with("session-"));

    let mut statuses = Vec::new();
    let mut screenshot_seen = false;
    loop {
        match recv(&mut client).await {
            ServerMessage::Update {
                session_id: sid,
                status,
                screenshot_b64,
                ..
            } => {
                assert_eq!(sid, session_id);
                screenshot_seen |= screenshot_b64.is_some();
                statuses.push(status);
                if status == SessionStatus::Completed {
                    break;
                }
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
    assert_eq!(
        statuses,
        vec![
            SessionStatus::Starting,
            SessionStatus::Analyzing,
            SessionStatus::StepSuccess,
            SessionStatus::Done,
            SessionStatus::Completed,
        ]
    );
    assert!(screenshot_seen, "step_success screenshot was not forwarded");

    // The registry entry goes away once the terminal update is out.
    let registry = gateway.registry();
    for _ in 0..50 {
        if !registry.contains(&session_id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session was never destroyed");
}

#[tokio::test]
async fn cancel_stops_a_running_session() {
    let (_gateway, mut client) = start_gateway(true).await;

    send(
        &mut client,
        &ClientMessage::Start {
            goal: "stuck goal".into(),
            url: "https://example.com".into(),
        },
    )
    .await;

    let session_id = match recv(&mut client).await {
        ServerMessage::Session { session_id } => session_id,
        other => panic!("expected session reply first, got {other:?}"),
    };
    match recv(&mut client).await {
        ServerMessage::Update { status, .. } => assert_eq!(status, SessionStatus::Starting),
        other => panic!("unexpected message: {other:?}"),
    }

    send(&mut client, &ClientMessage::Cancel { session_id }).await;

    let mut statuses = Vec::new();
    loop {
        match recv(&mut client).await {
            ServerMessage::Update { status, .. } => {
                statuses.push(status);
                if status == SessionStatus::Completed {
                    break;
                }
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
    assert_eq!(
        statuses,
        vec![SessionStatus::Failed, SessionStatus::Completed]
    );
}

#[tokio::test]
async fn unknown_cancel_and_junk_get_error_replies() {
    let (_gateway, mut client) = start_gateway(false).await;

    send(
        &mut client,
        &ClientMessage::Cancel {
            session_id: "session-404".into(),
        },
    )
    .await;
    match recv(&mut client).await {
        ServerMessage::Error { message } => assert!(message.contains("session-404")),
        other => panic!("unexpected message: {other:?}"),
    }

    client
        .send(Message::Text("{\"type\": \"launch_missiles\"}".into()))
        .await
        .expect("send failed");
    match recv(&mut client).await {
        ServerMessage::Error { message } => assert!(message.contains("unrecognized")),
        other => panic!("unexpected message: {other:?}"),
    }
}
