//! Session registry: at most one open stream per tenant.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::message::Message;
use crate::transport::{CloseReason, StreamSession};

/// Thread-safe registry of live tenant streams.
///
/// Every mutation of a tenant slot (open, replace, close, release) happens
/// under a single lock, so concurrent opens for the same tenant serialize and
/// exactly one of them ends up owning the slot.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, Arc<StreamSession>>>>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(SessionConfig::default())
    }

    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a fresh stream for `tenant_id`.
    ///
    /// A stream already open for the tenant is closed with
    /// [`CloseReason::Replaced`] before the new one is installed; the two are
    /// never connected at the same time.
    pub async fn open_session(&self, tenant_id: &str) -> Arc<StreamSession> {
        self.open_session_with(tenant_id, |_| async {}).await
    }

    /// Like [`open_session`](Self::open_session), but runs `prepare` on the
    /// new stream before it is connected or visible to `route_command`.
    ///
    /// Observers registered in `prepare` see every message routed to the
    /// stream.
    #[allow(clippy::significant_drop_tightening)]
    pub async fn open_session_with<F, Fut>(&self, tenant_id: &str, prepare: F) -> Arc<StreamSession>
    where
        F: FnOnce(Arc<StreamSession>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let session = Arc::new(StreamSession::with_queue_limit(
            tenant_id,
            self.config.max_queued_messages,
        ));
        prepare(Arc::clone(&session)).await;

        let mut sessions = self.sessions.lock().await;
        if let Some(prior) = sessions.remove(tenant_id) {
            prior.close(CloseReason::Replaced).await;
            info!(
                tenant_id,
                prior_session = %prior.session_id(),
                session_id = %session.session_id(),
                "Stream replaced by reconnect"
            );
        }
        session.set_connected(true).await;
        sessions.insert(tenant_id.to_string(), Arc::clone(&session));

        info!(tenant_id, session_id = %session.session_id(), "Stream opened");
        session
    }

    /// Current stream for `tenant_id`, if any.
    pub async fn get_session(&self, tenant_id: &str) -> Option<Arc<StreamSession>> {
        self.sessions.lock().await.get(tenant_id).cloned()
    }

    /// Close and forget the tenant's stream. Returns `false` if none was open.
    pub async fn close_session(&self, tenant_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.remove(tenant_id) else {
            debug!(tenant_id, "Close requested for tenant with no open stream");
            return false;
        };
        session.close(CloseReason::Explicit).await;
        drop(sessions);
        true
    }

    /// Close `session` and free its slot, but only if it still owns the slot.
    ///
    /// Used when a connection goes away: a stale stream that was already
    /// replaced must not evict its successor. Returns whether the slot was
    /// freed.
    pub async fn release(&self, session: &Arc<StreamSession>, reason: CloseReason) -> bool {
        let tenant_id = session.tenant_id();
        let mut sessions = self.sessions.lock().await;
        let owns_slot = sessions
            .get(tenant_id)
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if owns_slot {
            sessions.remove(tenant_id);
        }
        session.close(reason).await;
        drop(sessions);

        if !owns_slot {
            debug!(
                tenant_id,
                session_id = %session.session_id(),
                "Released stream no longer owned its slot"
            );
        }
        owns_slot
    }

    /// Deliver `message` over the tenant's open stream.
    pub async fn route_command(
        &self,
        tenant_id: &str,
        message: Message,
    ) -> Result<(), SessionError> {
        let no_stream = || SessionError::NoOpenStream {
            tenant_id: tenant_id.to_string(),
        };

        let session = self.get_session(tenant_id).await.ok_or_else(no_stream)?;
        session.send(message).await.map_err(|e| {
            warn!(tenant_id, error = %e, "Routed message hit a closed stream");
            no_stream()
        })
    }

    /// Close every open stream, e.g. on shutdown. Returns how many were closed.
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let mut sessions = self.sessions.lock().await;
        let drained: Vec<_> = sessions.drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close(reason).await;
        }
        drop(sessions);

        if !drained.is_empty() {
            info!(count = drained.len(), reason = %reason, "Closed all streams");
        }
        drained.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Tenants that currently have an open stream, sorted.
    pub async fn open_tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        tenants.sort();
        tenants
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
