//! Streaming transport bound to a single tenant.
//!
//! A [`StreamSession`] is one server-push channel to one remote client. It does
//! no I/O itself: the owner of the network connection registers a message
//! observer that writes frames to the wire and a close observer that tears the
//! connection down.

use std::collections::VecDeque;
use std::fmt;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SessionError;
use crate::message::Message;

/// Observer invoked for every message sent on the stream.
pub type MessageObserver = Box<dyn Fn(&Message) + Send + Sync>;

/// Observer invoked once when the stream closes.
pub type CloseObserver = Box<dyn FnOnce(CloseReason) + Send>;

/// Why a stream was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client went away.
    Client,
    /// Closed through the administrative surface.
    Explicit,
    /// A newer stream for the same tenant took over the slot.
    Replaced,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Explicit => write!(f, "explicit"),
            Self::Replaced => write!(f, "replaced"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

struct TransportState {
    connected: bool,
    closed: Option<CloseReason>,
    pending_outbound: VecDeque<Message>,
    on_message: Vec<MessageObserver>,
    on_close: Vec<CloseObserver>,
}

/// A single-use streaming transport for one tenant.
///
/// Send and close are serialized by one lock, so a send racing a close either
/// lands completely or fails with [`SessionError::NotConnected`]. Observers run
/// while that lock is held and must not call back into the session or the
/// registry that owns it.
pub struct StreamSession {
    tenant_id: String,
    session_id: String,
    max_queued: Option<usize>,
    state: Mutex<TransportState>,
}

impl StreamSession {
    /// Create a transport in the "not yet connected" state.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self::with_queue_limit(tenant_id, None)
    }

    /// Create a transport whose introspection queue keeps at most `max_queued`
    /// messages, evicting the oldest. `None` keeps everything.
    pub fn with_queue_limit(tenant_id: impl Into<String>, max_queued: Option<usize>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            session_id: Uuid::new_v4().to_string(),
            max_queued,
            state: Mutex::new(TransportState {
                connected: false,
                closed: None,
                pending_outbound: VecDeque::new(),
                on_message: Vec::new(),
                on_close: Vec::new(),
            }),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Unique id of this stream instance.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// Reason the stream was closed, or `None` while it is still usable.
    pub async fn close_reason(&self) -> Option<CloseReason> {
        self.state.lock().await.closed
    }

    /// Flip the connected flag once the wire-level handshake settles.
    ///
    /// Ignored after [`close`](Self::close): a closed transport is never reused.
    pub async fn set_connected(&self, connected: bool) {
        let mut state = self.state.lock().await;
        if state.closed.is_some() {
            debug!(
                tenant_id = %self.tenant_id,
                session_id = %self.session_id,
                "Ignoring connected flag change on closed stream"
            );
            return;
        }
        state.connected = connected;
    }

    /// Queue a message and hand it to every message observer, in order.
    pub async fn send(&self, message: Message) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(SessionError::NotConnected {
                tenant_id: self.tenant_id.clone(),
            });
        }

        for observer in &state.on_message {
            observer(&message);
        }

        state.pending_outbound.push_back(message);
        if let Some(max) = self.max_queued {
            while state.pending_outbound.len() > max {
                state.pending_outbound.pop_front();
            }
        }
        Ok(())
    }

    /// Close the stream and notify close observers exactly once.
    ///
    /// Returns `true` if this call performed the close, `false` if the stream
    /// was already closed.
    pub async fn close(&self, reason: CloseReason) -> bool {
        let mut state = self.state.lock().await;
        if state.closed.is_some() {
            return false;
        }
        state.connected = false;
        state.closed = Some(reason);

        // Message observers usually own the wire writer; dropping them lets it
        // finish once the close observers have run.
        let observers = std::mem::take(&mut state.on_close);
        let writers = std::mem::take(&mut state.on_message);
        for observer in observers {
            observer(reason);
        }
        drop(state);
        drop(writers);

        info!(
            tenant_id = %self.tenant_id,
            session_id = %self.session_id,
            reason = %reason,
            "Stream closed"
        );
        true
    }

    /// Register a message observer. Dropped without being called if the
    /// stream is already closed.
    pub async fn on_message<F>(&self, observer: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let mut state = self.state.lock().await;
        if state.closed.is_none() {
            state.on_message.push(Box::new(observer));
        }
    }

    /// Register a close observer. If the stream has already closed, the
    /// observer runs immediately with the recorded reason.
    pub async fn on_close<F>(&self, observer: F)
    where
        F: FnOnce(CloseReason) + Send + 'static,
    {
        let mut state = self.state.lock().await;
        let closed = state.closed;
        if let Some(reason) = closed {
            drop(state);
            observer(reason);
            return;
        }
        state.on_close.push(Box::new(observer));
    }

    /// Snapshot of every message sent so far (subject to the queue limit).
    pub async fn pending_outbound(&self) -> Vec<Message> {
        self.state
            .lock()
            .await
            .pending_outbound
            .iter()
            .cloned()
            .collect()
    }

    pub async fn clear_pending_outbound(&self) {
        self.state.lock().await.pending_outbound.clear();
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("tenant_id", &self.tenant_id)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
