//! Server-sent-events stream for an open tenant session.
//!
//! Opening a stream installs two observers on the new session before it goes
//! live: one forwards every sent message to the SSE body and one signals the
//! close. A pump task
//! drives the body, emits heartbeats, and frees the registry slot once the
//! client goes away.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, Sse};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use tenantmux_core::{CloseReason, Message, SessionError, SessionRegistry, StreamSession};

/// Body type of an open tenant stream.
pub type EventStream = ReceiverStream<Result<Event, Infallible>>;

type EventSender = mpsc::Sender<Result<Event, Infallible>>;

const EVENT_BUFFER: usize = 64;

/// Where the client should POST commands for this stream.
pub fn endpoint_path(tenant_id: &str, session_id: &str) -> String {
    format!("/{tenant_id}/mcp?sessionId={session_id}")
}

/// Open (or replace) the tenant's stream and return the SSE response body.
pub async fn open(
    registry: &SessionRegistry,
    tenant_id: &str,
    heartbeat: Duration,
) -> Sse<EventStream> {
    let (message_tx, message_rx) = mpsc::unbounded_channel::<Message>();
    let (close_tx, close_rx) = oneshot::channel::<CloseReason>();
    let session = registry
        .open_session_with(tenant_id, move |session| async move {
            session
                .on_message(move |message| {
                    let _ = message_tx.send(message.clone());
                })
                .await;
            session
                .on_close(move |reason| {
                    let _ = close_tx.send(reason);
                })
                .await;
        })
        .await;

    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(pump(
        registry.clone(),
        session,
        message_rx,
        close_rx,
        event_tx,
        heartbeat,
    ));

    Sse::new(ReceiverStream::new(event_rx))
}

enum Outcome {
    ClientGone,
    Closed(Option<CloseReason>),
}

async fn pump(
    registry: SessionRegistry,
    session: Arc<StreamSession>,
    mut message_rx: mpsc::UnboundedReceiver<Message>,
    mut close_rx: oneshot::Receiver<CloseReason>,
    event_tx: EventSender,
    heartbeat: Duration,
) {
    let tenant_id = session.tenant_id().to_string();
    let session_id = session.session_id().to_string();

    let endpoint = Event::default()
        .event("endpoint")
        .data(endpoint_path(&tenant_id, &session_id));
    if event_tx.send(Ok(endpoint)).await.is_err() {
        registry.release(&session, CloseReason::Client).await;
        return;
    }

    let mut heartbeat_timer = tokio::time::interval(heartbeat);
    heartbeat_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat_timer.tick().await; // Skip first immediate tick

    let outcome = loop {
        tokio::select! {
            biased;
            Some(message) = message_rx.recv() => {
                if !forward(&event_tx, &message).await {
                    break Outcome::ClientGone;
                }
            }
            reason = &mut close_rx => {
                // Deliver whatever was sent before the close landed.
                while let Ok(message) = message_rx.try_recv() {
                    if !forward(&event_tx, &message).await {
                        break;
                    }
                }
                break Outcome::Closed(reason.ok());
            }
            () = event_tx.closed() => break Outcome::ClientGone,
            _ = heartbeat_timer.tick() => {
                let ping = Event::default().comment("keep-alive");
                if event_tx.send(Ok(ping)).await.is_err() {
                    break Outcome::ClientGone;
                }
                debug!(tenant_id = %tenant_id, session_id = %session_id, "Heartbeat sent");
            }
        }
    };

    match outcome {
        Outcome::ClientGone => {
            info!(tenant_id = %tenant_id, session_id = %session_id, "Client disconnected");
            registry.release(&session, CloseReason::Client).await;
        }
        Outcome::Closed(reason) => {
            let data = match reason {
                Some(CloseReason::Replaced) => SessionError::StreamReplaced {
                    tenant_id: tenant_id.clone(),
                }
                .to_string(),
                Some(reason) => reason.to_string(),
                None => CloseReason::Client.to_string(),
            };
            let _ = event_tx
                .send(Ok(Event::default().event("close").data(data)))
                .await;
            debug!(tenant_id = %tenant_id, session_id = %session_id, "Stream body finished");
            // No-op unless the session was closed behind the registry's back.
            registry.release(&session, CloseReason::Client).await;
        }
    }
}

/// Write one message as an SSE `message` event. Returns `false` once the
/// client is gone.
async fn forward(event_tx: &EventSender, message: &Message) -> bool {
    let line = match message.to_line() {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "Dropping message that failed to serialize");
            return true;
        }
    };
    event_tx
        .send(Ok(Event::default().event("message").data(line)))
        .await
        .is_ok()
}
