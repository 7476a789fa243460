//! Session registry: ceiling enforcement and the idle sweep.
//!
//! # Responsibilities
//! - Track every live session by ID
//! - Enforce the maximum-session ceiling (semaphore-backed slots)
//! - Periodically evict sessions whose `is_active()` reports false
//! - Stop sessions before dropping them (workers join before resources free)
//!
//! # Design Decisions
//! - Refuse-at-capacity rather than queue-at-capacity: an accept loop gets
//!   an immediate `AtCapacity` and can close the socket
//! - The slot permit lives inside the registry entry, so a slot is released
//!   exactly when the entry is removed, on every path

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::time;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::net::session::{Session, SessionId};
use crate::net::stream::SessionStream;
use crate::observability::metrics;

struct SessionEntry {
    session: Arc<Session>,
    /// Released when the entry is removed.
    _permit: OwnedSemaphorePermit,
}

/// Owns the live-session table and the session ceiling.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    slots: Arc<Semaphore>,
    max_sessions: usize,
    session_config: SessionConfig,
}

impl SessionRegistry {
    /// Create a registry admitting at most `max_sessions` concurrent sessions.
    pub fn new(max_sessions: usize, session_config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            slots: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
            session_config,
        }
    }

    /// Build and track a session for an accepted transport.
    ///
    /// Fails with `AtCapacity` when every slot is taken; the caller should
    /// drop the stream, which closes the socket.
    pub fn register(&self, stream: SessionStream) -> SessionResult<Arc<Session>> {
        let permit = Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|_| SessionError::AtCapacity {
                max: self.max_sessions,
            })?;

        let session = Session::new(stream, self.session_config.clone())?;
        self.sessions.insert(
            session.id(),
            SessionEntry {
                session: Arc::clone(&session),
                _permit: permit,
            },
        );
        metrics::record_sessions_active(self.sessions.len());

        tracing::debug!(
            session_id = %session.id(),
            active = self.sessions.len(),
            available_slots = self.slots.available_permits(),
            "Session registered"
        );
        Ok(session)
    }

    /// Look up a live session.
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| Arc::clone(&entry.session))
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Configured ceiling.
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Remaining free slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Stop and remove one session. Returns false when it was not tracked.
    pub async fn deregister(&self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some((_, entry)) => {
                let _ = entry.session.stop().await;
                metrics::record_sessions_active(self.sessions.len());
                true
            }
            None => false,
        }
    }

    /// Evict every session that is no longer active (disconnected, halted,
    /// or past the idle timeout). Each eviction stops the session first, so
    /// its workers are joined before the entry and its slot are released.
    ///
    /// Returns the number of sessions evicted.
    pub async fn sweep(&self) -> usize {
        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| !entry.value().session.is_active())
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for id in stale {
            if let Some((_, entry)) = self.sessions.remove(&id) {
                if let Err(e) = entry.session.stop().await {
                    tracing::warn!(session_id = %id, error = %e, "Eviction stop");
                }
                metrics::record_session_evicted();
                evicted += 1;
            }
        }

        if evicted > 0 {
            metrics::record_sessions_active(self.sessions.len());
            tracing::info!(evicted, active = self.sessions.len(), "Idle sweep evicted sessions");
        }
        evicted
    }

    /// Periodic sweep loop; exits on the shutdown signal.
    pub async fn run_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(interval_secs = interval.as_secs(), "Session sweeper starting");
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Stop and drop every session (process shutdown).
    pub async fn shutdown_all(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, entry)) = self.sessions.remove(&id) {
                let _ = entry.session.stop().await;
            }
        }
        metrics::record_sessions_active(0);
        tracing::info!("All sessions stopped");
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("active", &self.sessions.len())
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn accepted_stream(listener: &TcpListener) -> (SessionStream, TcpStream) {
        let addr = listener.local_addr().unwrap();
        let remote = TcpStream::connect(addr).await.unwrap();
        let (local, _) = listener.accept().await.unwrap();
        (SessionStream::plain(local), remote)
    }

    #[tokio::test]
    async fn ceiling_refuses_then_recovers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = SessionRegistry::new(1, SessionConfig::default());

        let (stream_a, _remote_a) = accepted_stream(&listener).await;
        let session = registry.register(stream_a).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.available_slots(), 0);

        let (stream_b, _remote_b) = accepted_stream(&listener).await;
        assert!(matches!(
            registry.register(stream_b),
            Err(SessionError::AtCapacity { max: 1 })
        ));

        assert!(registry.deregister(session.id()).await);
        assert_eq!(registry.available_slots(), 1);

        let (stream_c, _remote_c) = accepted_stream(&listener).await;
        assert!(registry.register(stream_c).is_ok());
    }

    #[tokio::test]
    async fn sweep_evicts_only_inactive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = SessionRegistry::new(10, SessionConfig::default());

        let (stream_a, remote_a) = accepted_stream(&listener).await;
        let dead = registry.register(stream_a).unwrap();
        let (stream_b, _remote_b) = accepted_stream(&listener).await;
        let live = registry.register(stream_b).unwrap();

        // Kill one peer and observe the close.
        drop(remote_a);
        let mut buf = [0u8; 4];
        assert_eq!(dead.receive(&mut buf).await.unwrap(), 0);

        assert_eq!(registry.sweep().await, 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(live.id()).is_some());
        assert!(registry.get(dead.id()).is_none());
    }

    #[tokio::test]
    async fn shutdown_all_halts_everything() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = SessionRegistry::new(10, SessionConfig::default());

        let mut sessions = Vec::new();
        let mut remotes = Vec::new();
        for _ in 0..3 {
            let (stream, remote) = accepted_stream(&listener).await;
            let session = registry.register(stream).unwrap();
            session.start();
            sessions.push(session);
            remotes.push(remote);
        }

        registry.shutdown_all().await;
        assert!(registry.is_empty());
        for session in &sessions {
            assert!(session.is_halted());
            assert!(!session.workers_started());
        }
    }
}
