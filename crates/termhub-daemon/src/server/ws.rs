//! Per-connection WebSocket protocol handling.
//!
//! A connection authenticates with a `hello` frame, then exchanges the JSON
//! events from `termhub-proto`. Session output arrives through the broadcast
//! subscription handed out at join; the select loop interleaves it with
//! client frames.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use termhub_proto::{ClientEvent, Hello, ServerEvent};

use crate::gateway::{ClientConnection, Gateway};
use crate::session::SessionEvent;

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

type Ws = WebSocketStream<TcpStream>;

pub async fn handle_connection(
    gateway: Arc<Gateway>,
    stream: TcpStream,
    peer: SocketAddr,
) -> anyhow::Result<()> {
    let mut ws = accept_async(stream).await?;
    let hello = read_hello(&mut ws).await?;
    let mut conn = ClientConnection::new(&hello.user_id);
    info!(%peer, user_id = %hello.user_id, client_id = %conn.client_id(), "Client connected");

    let mut session_events: Option<broadcast::Receiver<SessionEvent>> = None;

    loop {
        tokio::select! {
            event = next_session_event(&mut session_events) => {
                match event {
                    Ok(SessionEvent::Output(data)) => {
                        send_event(&mut ws, &ServerEvent::Output { data }).await?;
                    }
                    Ok(SessionEvent::Exit { exit_code }) => {
                        conn.clear_attachment();
                        session_events = None;
                        send_event(&mut ws, &ServerEvent::Exit { exit_code }).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            client_id = %conn.client_id(),
                            skipped,
                            "Client too slow, output frames dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        session_events = None;
                    }
                }
            }
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(text.as_str()) {
                            Ok(event) => {
                                handle_client_event(
                                    &gateway,
                                    &mut conn,
                                    &mut ws,
                                    &mut session_events,
                                    event,
                                )
                                .await?;
                            }
                            Err(e) => {
                                send_event(
                                    &mut ws,
                                    &ServerEvent::Error {
                                        message: format!("Malformed event: {e}"),
                                    },
                                )
                                .await?;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        ws.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(client_id = %conn.client_id(), error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }

    gateway.disconnect(&mut conn).await;
    Ok(())
}

async fn handle_client_event(
    gateway: &Gateway,
    conn: &mut ClientConnection,
    ws: &mut Ws,
    session_events: &mut Option<broadcast::Receiver<SessionEvent>>,
    event: ClientEvent,
) -> anyhow::Result<()> {
    match event {
        ClientEvent::Join { session_id } => match gateway.join(conn, &session_id).await {
            Ok(joined) => {
                // Catch-up goes out before anything live can: the live
                // subscription is only polled once it is installed here, so
                // the replay frame precedes every live output frame. Sent
                // even when empty, so every join sees the same frame order.
                send_event(
                    ws,
                    &ServerEvent::Output {
                        data: joined.grant.replay,
                    },
                )
                .await?;
                *session_events = Some(joined.grant.events);
                send_event(
                    ws,
                    &ServerEvent::Joined {
                        session_id: joined.session_id,
                        role: joined.role,
                    },
                )
                .await?;
            }
            Err(e) => {
                // A failed join may already have left the previous session
                // (the gateway detaches before attaching); drop its live
                // subscription so a detached connection receives nothing.
                if conn.session_id().is_none() {
                    *session_events = None;
                }
                send_event(
                    ws,
                    &ServerEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await?;
            }
        },
        ClientEvent::Input { data } => {
            if let Err(e) = gateway.input(conn, &data).await {
                send_event(
                    ws,
                    &ServerEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await?;
            }
        }
        ClientEvent::Resize { cols, rows } => {
            gateway.resize(conn, cols, rows).await;
        }
        ClientEvent::Leave => {
            gateway.leave(conn).await;
            *session_events = None;
        }
    }
    Ok(())
}

/// Live event stream, pending while no session is attached so the select
/// loop only wakes for client frames.
async fn next_session_event(
    events: &mut Option<broadcast::Receiver<SessionEvent>>,
) -> Result<SessionEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn read_hello(ws: &mut Ws) -> anyhow::Result<Hello> {
    let frame = tokio::time::timeout(HELLO_TIMEOUT, ws.next())
        .await
        .map_err(|_| anyhow::anyhow!("Timed out waiting for hello"))?
        .ok_or_else(|| anyhow::anyhow!("Connection closed before hello"))??;

    let hello: Hello = serde_json::from_str(frame.to_text()?)?;
    if hello.user_id.is_empty() {
        anyhow::bail!("Hello with empty user_id");
    }
    Ok(hello)
}

async fn send_event(ws: &mut Ws, event: &ServerEvent) -> anyhow::Result<()> {
    let payload = serde_json::to_string(event)?;
    ws.send(Message::Text(payload.into())).await?;
    Ok(())
}
