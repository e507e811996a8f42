//! Session table for the Streamable HTTP transport.
//!
//! Each session binds one [`McpServer`] to the id handed to the client in the
//! `Mcp-Session-Id` header. Sessions end on an explicit `DELETE`, on idle
//! eviction, or when the gateway shuts down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::mcp::error::McpError;
use crate::mcp::server::{McpServer, ServerContext};

/// One live session.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_seen: std::sync::Mutex<Instant>,
    /// Fair mutex: exchanges acquire the server in arrival order.
    server: Arc<Mutex<McpServer>>,
    closed: watch::Sender<bool>,
    stream_open: AtomicBool,
}

impl Session {
    fn new(context: Arc<ServerContext>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            last_seen: std::sync::Mutex::new(Instant::now()),
            server: Arc::new(Mutex::new(McpServer::new(context))),
            closed,
            stream_open: AtomicBool::new(false),
        }
    }

    /// The id sent in the `Mcp-Session-Id` header.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The protocol server bound to this session.
    #[must_use]
    pub const fn server(&self) -> &Arc<Mutex<McpServer>> {
        &self.server
    }

    /// Records activity now.
    pub fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time since the last recorded activity, measured at `now`.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        let last_seen = *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last_seen)
    }

    /// Returns `true` once the session has been torn down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Subscribes to teardown. The value flips to `true` exactly once.
    #[must_use]
    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Claims the standalone server-to-client stream.
    ///
    /// Returns `None` if a stream is already open. The claim is released when
    /// the guard drops.
    #[must_use]
    pub fn try_open_stream(self: &Arc<Self>) -> Option<StreamGuard> {
        self.stream_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| StreamGuard {
                session: Arc::clone(self),
            })
    }

    /// Signals teardown and closes the bound server.
    ///
    /// Waits for any in-flight exchange on this session to finish first.
    async fn close(&self) {
        self.closed.send_replace(true);
        self.server.lock().await.close();
        tracing::debug!(
            session_id = %self.id,
            created_at = %self.created_at.to_rfc3339(),
            "Session closed"
        );
    }
}

/// Holds the claim on a session's standalone stream.
#[derive(Debug)]
pub struct StreamGuard {
    session: Arc<Session>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.session.stream_open.store(false, Ordering::Release);
    }
}

/// The session table.
#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    context: Arc<ServerContext>,
    idle_timeout: Duration,
}

impl SessionManager {
    /// Creates an empty table whose sessions share `context`.
    #[must_use]
    pub fn new(context: Arc<ServerContext>, idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            context,
            idle_timeout,
        }
    }

    /// Creates a session with a fresh server.
    pub async fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(Arc::clone(&self.context)));
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), Arc::clone(&session));
        tracing::info!(session_id = %session.id, "Session created");
        session
    }

    /// Looks up a session and records activity on it.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::UnknownSession`] if the id is unknown or evicted.
    pub async fn get(&self, id: &str) -> Result<Arc<Session>, McpError> {
        let session = self
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| McpError::UnknownSession(id.to_string()))?;
        session.touch();
        Ok(session)
    }

    /// Tears a session down and removes it from the table.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::UnknownSession`] if the id is unknown.
    pub async fn remove(&self, id: &str) -> Result<(), McpError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| McpError::UnknownSession(id.to_string()))?;
        session.close().await;
        tracing::info!(session_id = %id, "Session deleted");
        Ok(())
    }

    /// Evicts sessions idle for longer than the timeout at `now`.
    ///
    /// Returns the number of sessions evicted.
    pub async fn evict_idle_at(&self, now: Instant) -> usize {
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .values()
                .filter(|s| s.idle_for(now) > self.idle_timeout)
                .map(|s| s.id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            session.close().await;
            tracing::info!(session_id = %session.id, "Session evicted after idle timeout");
        }
        expired.len()
    }

    /// Evicts sessions idle for longer than the timeout.
    pub async fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now()).await
    }

    /// Tears down every session.
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Session>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close().await;
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Closed all sessions");
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if there are no live sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Starts the background idle sweeper.
    ///
    /// The task stops on its own once the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let evicted = manager.evict_idle().await;
                if evicted > 0 {
                    tracing::debug!(evicted, "Idle sweep finished");
                }
            }
        })
    }
}
