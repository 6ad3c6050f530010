//! Connection driver
//!
//! Sole owner of the WebSocket. Inbound frames and operator commands are
//! multiplexed with `select!`, fed to the [`Session`], and the resulting
//! transitions applied here. The command reader never sees the socket.

use anyhow::Context;
use futures::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};

use vtsctl_core::{Command, CredentialStore, Inbound, Session, SessionEvent, Transition};

/// Receives session events for display
pub trait EventSink {
    fn emit(&mut self, event: &SessionEvent);
}

impl EventSink for Vec<SessionEvent> {
    fn emit(&mut self, event: &SessionEvent) {
        self.push(event.clone());
    }
}

/// Why the session ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Operator typed `quit`
    Quit,
    /// VTube Studio closed the connection
    RemoteClosed,
}

/// Run one session over an open connection until quit, close or failure
///
/// Whatever the outcome, the session is `Disconnected` on return and the
/// last event emitted is [`SessionEvent::Disconnected`].
pub async fn run<S, E>(
    ws: WebSocketStream<S>,
    session: &mut Session,
    store: &mut CredentialStore,
    commands: mpsc::Receiver<Command>,
    events: &mut E,
) -> anyhow::Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: EventSink,
{
    let result = drive(ws, session, store, commands, events).await;

    if let Err(e) = &result {
        tracing::error!("Session failed: {:#}", e);
        let t = session.on_close(format!("{:#}", e));
        for event in &t.events {
            events.emit(event);
        }
    }

    result
}

async fn drive<S, E>(
    ws: WebSocketStream<S>,
    session: &mut Session,
    store: &mut CredentialStore,
    mut commands: mpsc::Receiver<Command>,
    events: &mut E,
) -> anyhow::Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: EventSink,
{
    let (mut sink, mut stream) = ws.split();
    let mut commands_open = true;

    let t = session.on_open();
    apply(&mut sink, session, store, events, t).await?;

    loop {
        tokio::select! {
            cmd = commands.recv(), if commands_open => {
                let Some(cmd) = cmd else {
                    tracing::debug!("Command input closed");
                    commands_open = false;
                    continue;
                };

                let t = session.handle_command(cmd);
                if apply(&mut sink, session, store, events, t).await? {
                    if let Err(e) = sink.close().await {
                        tracing::debug!("Close handshake failed: {}", e);
                    }
                    let t = session.on_close("closed by operator");
                    apply(&mut sink, session, store, events, t).await?;
                    return Ok(SessionEnd::Quit);
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let inbound = Inbound::decode(text.as_str())
                            .context("VTube Studio sent a malformed frame")?;

                        tracing::debug!(request_id = %inbound.request_id, "<- {}", inbound.response.type_name());
                        let t = session.on_inbound(inbound);
                        apply(&mut sink, session, store, events, t).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("VTube Studio closed the connection");
                        let t = session.on_close("connection closed");
                        apply(&mut sink, session, store, events, t).await?;
                        return Ok(SessionEnd::RemoteClosed);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!("Ignoring binary frame");
                    }
                    // Ping/pong are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(e).context("Connection to VTube Studio failed");
                    }
                }
            }
        }
    }
}

/// Apply a transition: persist, send, report. Returns the close flag.
async fn apply<W, E>(
    sink: &mut W,
    session: &mut Session,
    store: &mut CredentialStore,
    events: &mut E,
    t: Transition,
) -> anyhow::Result<bool>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
    E: EventSink,
{
    // The token must be on disk before it is used
    if let Some(token) = &t.persist {
        if let Err(e) = store.save(token) {
            session.forget_token();
            return Err(e).context("Failed to persist authentication token");
        }
    }

    for out in &t.outbound {
        let text = out.to_json()?;
        tracing::debug!(request_id = %out.request_id, "-> {}", out.request.message_type());
        sink.send(Message::Text(text.into()))
            .await
            .with_context(|| format!("Failed to send {}", out.request.message_type()))?;
    }

    for event in &t.events {
        events.emit(event);
    }

    Ok(t.close)
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, connect_async};
    use vtsctl_core::protocol::{API_NAME, API_VERSION, Envelope, PluginIdentity};
    use vtsctl_core::{ExpressionCatalog, SessionState, Token};

    fn identity() -> PluginIdentity {
        PluginIdentity {
            plugin_name: "vtsctl".to_string(),
            plugin_developer: "tests".to_string(),
        }
    }

    async fn recv_request(ws: &mut WebSocketStream<TcpStream>) -> Envelope {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("Connection ended early: {:?}", other),
            }
        }
    }

    fn reply(request_id: &str, message_type: &str, data: Value) -> Message {
        let frame = json!({
            "apiName": API_NAME,
            "apiVersion": API_VERSION,
            "timestamp": 0,
            "requestID": request_id,
            "messageType": message_type,
            "data": data,
        });
        Message::Text(frame.to_string().into())
    }

    /// Drain the client until it closes, returning any text frames seen
    async fn drain(ws: &mut WebSocketStream<TcpStream>) -> Vec<String> {
        let mut texts = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => texts.push(text.as_str().to_string()),
                Message::Close(_) => break,
                _ => {}
            }
        }
        texts
    }

    #[tokio::test]
    async fn test_fresh_handshake_then_operator_activation() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("vtube_token.txt");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let req = recv_request(&mut ws).await;
            assert_eq!(req.message_type, "AuthenticationTokenRequest");
            assert_eq!(req.data["pluginName"], "vtsctl");
            ws.send(reply(
                &req.request_id,
                "AuthenticationTokenResponse",
                json!({"authenticationToken": "abc123"}),
            ))
            .await
            .unwrap();

            let req = recv_request(&mut ws).await;
            assert_eq!(req.message_type, "AuthenticationRequest");
            assert_eq!(req.data["authenticationToken"], "abc123");
            ws.send(reply(
                &req.request_id,
                "AuthenticationResponse",
                json!({"authenticated": true, "reason": "Token valid."}),
            ))
            .await
            .unwrap();

            let req = recv_request(&mut ws).await;
            assert_eq!(req.message_type, "ExpressionStateRequest");
            assert_eq!(req.data["details"], true);
            ws.send(reply(
                &req.request_id,
                "ExpressionStateResponse",
                json!({
                    "modelLoaded": true,
                    "modelName": "Akari",
                    "expressions": [{"name": "Smile", "file": "Smile.exp3.json", "active": false}]
                }),
            ))
            .await
            .unwrap();

            cmd_tx.send(Command::Activate("smile".to_string())).await.unwrap();
            let req = recv_request(&mut ws).await;
            assert_eq!(req.message_type, "ExpressionActivationRequest");
            assert_eq!(
                req.data,
                json!({"expressionFile": "Smile.exp3.json", "active": true, "disableOthers": true})
            );
            ws.send(reply(&req.request_id, "ExpressionActivationResponse", json!({})))
                .await
                .unwrap();

            cmd_tx.send(Command::Quit).await.unwrap();
            assert!(drain(&mut ws).await.is_empty());
        });

        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let mut store = CredentialStore::new(&token_path);
        let mut session = Session::new(identity(), ExpressionCatalog::default(), store.load().unwrap());
        let mut events: Vec<SessionEvent> = Vec::new();

        let end = run(ws, &mut session, &mut store, cmd_rx, &mut events).await.unwrap();
        server.await.unwrap();

        assert_eq!(end, SessionEnd::Quit);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(std::fs::read_to_string(&token_path).unwrap(), "abc123");

        assert!(events.contains(&SessionEvent::TokenIssued));
        assert!(events.contains(&SessionEvent::Authenticated));
        assert!(events.contains(&SessionEvent::ExpressionRequested {
            file: "Smile.exp3.json".to_string(),
            active: true,
        }));
        assert!(matches!(events.last(), Some(SessionEvent::Disconnected { .. })));
    }

    #[tokio::test]
    async fn test_rejected_token_blocks_commands() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("vtube_token.txt");
        std::fs::write(&token_path, "stale\n").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let req = recv_request(&mut ws).await;
            assert_eq!(req.message_type, "AuthenticationRequest");
            assert_eq!(req.data["authenticationToken"], "stale");
            ws.send(reply(
                &req.request_id,
                "AuthenticationResponse",
                json!({"authenticated": false, "reason": "Token invalid."}),
            ))
            .await
            .unwrap();

            ws.close(None).await.unwrap();
            drain(&mut ws).await
        });

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        // Typed before authentication completes
        cmd_tx.send(Command::Activate("smile".to_string())).await.unwrap();

        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let mut store = CredentialStore::new(&token_path);
        let mut session = Session::new(identity(), ExpressionCatalog::default(), store.load().unwrap());
        let mut events: Vec<SessionEvent> = Vec::new();

        let end = run(ws, &mut session, &mut store, cmd_rx, &mut events).await.unwrap();
        let late_frames = server.await.unwrap();

        assert_eq!(end, SessionEnd::RemoteClosed);
        assert!(late_frames.is_empty(), "unexpected requests: {:?}", late_frames);
        assert!(events.contains(&SessionEvent::AuthenticationRejected {
            reason: Some("Token invalid.".to_string())
        }));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, SessionEvent::ExpressionRequested { .. }))
        );
        assert!(!events.contains(&SessionEvent::TokenRequested));
        assert_eq!(session.token(), Token::new("stale").as_ref());
        drop(cmd_tx);
    }

    #[tokio::test]
    async fn test_token_save_failure_is_fatal_before_use() {
        let dir = tempfile::tempdir().unwrap();
        // The token's parent directory is a regular file
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "").unwrap();
        let token_path = blocker.join("vtube_token.txt");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let req = recv_request(&mut ws).await;
            assert_eq!(req.message_type, "AuthenticationTokenRequest");
            ws.send(reply(
                &req.request_id,
                "AuthenticationTokenResponse",
                json!({"authenticationToken": "abc123"}),
            ))
            .await
            .unwrap();

            drain(&mut ws).await
        });

        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let mut store = CredentialStore::new(&token_path);
        let mut session = Session::new(identity(), ExpressionCatalog::default(), None);
        let mut events: Vec<SessionEvent> = Vec::new();

        let result = run(ws, &mut session, &mut store, cmd_rx, &mut events).await;
        let frames_after_token = server.await.unwrap();

        assert!(result.is_err());
        assert!(
            !frames_after_token
                .iter()
                .any(|f| f.contains("\"AuthenticationRequest\"")),
            "token used before it was saved: {:?}",
            frames_after_token
        );
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.token(), None);
        assert!(!events.contains(&SessionEvent::AuthenticationStarted));
        assert!(matches!(events.last(), Some(SessionEvent::Disconnected { .. })));
        assert!(!token_path.exists());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = recv_request(&mut ws).await;
            ws.send(Message::Text("not json".into())).await.unwrap();
            drain(&mut ws).await;
        });

        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let mut store = CredentialStore::new(dir.path().join("vtube_token.txt"));
        let mut session = Session::new(identity(), ExpressionCatalog::default(), None);
        let mut events: Vec<SessionEvent> = Vec::new();

        let result = run(ws, &mut session, &mut store, cmd_rx, &mut events).await;
        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(events.last(), Some(SessionEvent::Disconnected { .. })));
        server.await.unwrap();
    }
}
