/// Connection endpoint
///
/// Each upgraded socket runs two tasks. The write pump drains the client's
/// outbound queue and pings the peer on the heartbeat period; the read pump
/// applies the read deadline and hands chat frames to the message service.
/// Either side ending releases the client from the hub and closes the socket.
use actix::Addr;
use actix_web::web;
use actix_ws::{Message, MessageStream, Session};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use uuid::Uuid;

use super::events::{UnregisterChat, UnregisterDashboard};
use super::message::ChatFrame;
use super::server::Hub;
use crate::api::error;
use crate::constants::{PING_PERIOD, PONG_WAIT, WRITE_WAIT};
use crate::modules::message::{model::MessageResponse, service::MessageService};

#[derive(Debug, Clone, Copy)]
pub enum ClientRef {
    Chat(Uuid),
    Dashboard(Uuid),
}

impl ClientRef {
    fn release(&self, hub: &Addr<Hub>) {
        match *self {
            ClientRef::Chat(client_id) => hub.do_send(UnregisterChat { client_id }),
            ClientRef::Dashboard(client_id) => hub.do_send(UnregisterDashboard { client_id }),
        }
    }
}

/// What the read pump does with inbound text.
pub enum Endpoint {
    Chat { user_id: Uuid, messages: web::Data<MessageService> },
    Dashboard { session_id: Uuid },
}

impl Endpoint {
    async fn on_text(&self, text: &str) {
        match self {
            Endpoint::Chat { user_id, messages } => {
                if let Err(e) = handle_chat_frame(messages, *user_id, text).await {
                    tracing::warn!(user = %user_id, error = %e, "chat frame rejected");
                }
            }
            Endpoint::Dashboard { session_id } => {
                tracing::debug!(session = %session_id, "dashboard frame discarded");
            }
        }
    }
}

/// Parses an inbound chat frame and sends it as `user_id`.
pub async fn handle_chat_frame(
    messages: &MessageService,
    user_id: Uuid,
    text: &str,
) -> Result<MessageResponse, error::SystemError> {
    let frame: ChatFrame = serde_json::from_str(text)
        .map_err(|e| error::SystemError::bad_request(format!("Malformed chat frame: {e}")))?;

    messages.send(frame.conversation_id, user_id, frame.content, frame.message_type).await
}

/// Ping period and read deadline of a socket. Register a
/// `web::Data<Heartbeat>` to override the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub ping_period: Duration,
    pub pong_wait: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self { ping_period: PING_PERIOD, pong_wait: PONG_WAIT }
    }
}

pub fn spawn(
    session: Session,
    stream: MessageStream,
    outbound: mpsc::Receiver<String>,
    client: ClientRef,
    endpoint: Endpoint,
    hub: Addr<Hub>,
    heartbeat: Heartbeat,
) {
    actix_web::rt::spawn(write_pump(
        session.clone(),
        outbound,
        client,
        hub.clone(),
        heartbeat.ping_period,
    ));
    actix_web::rt::spawn(read_pump(session, stream, client, endpoint, hub, heartbeat.pong_wait));
}

async fn write_within_deadline<F>(write: F) -> bool
where
    F: Future<Output = Result<(), actix_ws::Closed>>,
{
    matches!(timeout(WRITE_WAIT, write).await, Ok(Ok(())))
}

async fn write_pump(
    mut session: Session,
    mut outbound: mpsc::Receiver<String>,
    client: ClientRef,
    hub: Addr<Hub>,
    ping_period: Duration,
) {
    let mut heartbeat = interval_at(Instant::now() + ping_period, ping_period);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    tracing::debug!(?client, "outbound queue closed");
                    break;
                };
                if !write_within_deadline(session.text(frame)).await {
                    tracing::info!(?client, "write failed");
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if !write_within_deadline(session.ping(b"")).await {
                    tracing::info!(?client, "ping failed");
                    break;
                }
            }
        }
    }

    client.release(&hub);
    let _ = session.close(None).await;
}

async fn read_pump(
    mut session: Session,
    mut stream: MessageStream,
    client: ClientRef,
    endpoint: Endpoint,
    hub: Addr<Hub>,
    pong_wait: Duration,
) {
    loop {
        let message = match timeout(pong_wait, stream.recv()).await {
            Err(_) => {
                tracing::info!(?client, "read deadline exceeded");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::info!(?client, error = %e, "websocket protocol error");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => endpoint.on_text(&text).await,
            Message::Binary(_) => tracing::debug!(?client, "binary frame ignored"),
            Message::Ping(bytes) => {
                if session.pong(&bytes).await.is_err() {
                    break;
                }
            }
            Message::Pong(_) => {}
            Message::Close(reason) => {
                tracing::debug!(?client, ?reason, "peer closed");
                break;
            }
            // fragmented frames are not part of the protocol
            Message::Continuation(_) | Message::Nop => {}
        }
    }

    client.release(&hub);
    let _ = session.close(None).await;
}
