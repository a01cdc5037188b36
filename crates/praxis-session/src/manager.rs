use crate::session::{Session, SessionStatus, SessionSummary};
use crate::store::SessionStore;
use chrono::Utc;
use praxis_core::{CaseContext, PraxisError, PraxisResult, Turn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tuning knobs for [`SessionManager`].
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// How long a cached read stays valid before falling through to the store.
    pub cache_ttl: Duration,
    /// Sessions older than this are removed by [`SessionManager::sweep_expired`].
    pub retention_max_age: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            retention_max_age: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

struct CachedSession {
    session: Session,
    expires_at: Instant,
}

/// Write-through cached front for a [`SessionStore`].
///
/// Every mutation persists to the durable store before the read cache is
/// updated, so a `load` from any caller (including after a restart) observes
/// the latest committed state. Mutations on the same session id are
/// serialized by a per-id async lock; different sessions proceed
/// independently.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: SessionManagerConfig,
    cache: Mutex<HashMap<Uuid, CachedSession>>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SessionManager {
    /// Wrap `store` with caching and per-id locking.
    pub fn new(store: Arc<dyn SessionStore>, config: SessionManagerConfig) -> Self {
        Self {
            store,
            config,
            cache: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock handle for one session id. The map guard is held only long
    /// enough to clone the `Arc`.
    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(id).or_default())
    }

    async fn cache_put(&self, session: &Session) {
        let mut cache = self.cache.lock().await;
        cache.insert(
            session.id,
            CachedSession {
                session: session.clone(),
                expires_at: Instant::now() + self.config.cache_ttl,
            },
        );
    }

    async fn cache_get(&self, id: Uuid) -> Option<Session> {
        let mut cache = self.cache.lock().await;
        match cache.get(&id) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.session.clone()),
            Some(_) => {
                cache.remove(&id);
                None
            }
            None => None,
        }
    }

    /// Allocate and persist a fresh active session.
    pub async fn create(&self, case: Option<CaseContext>) -> PraxisResult<Session> {
        let mut session = Session::new();
        session.case = case;
        self.store.create(&session).await?;
        self.cache_put(&session).await;
        info!(session_id = %session.id, "session created");
        Ok(session)
    }

    /// Load a session, serving from the read cache when it is still valid.
    pub async fn load(&self, id: Uuid) -> PraxisResult<Option<Session>> {
        if let Some(session) = self.cache_get(id).await {
            debug!(session_id = %id, "session served from cache");
            return Ok(Some(session));
        }
        let Some(session) = self.store.get(id).await? else {
            return Ok(None);
        };
        self.cache_put(&session).await;
        Ok(Some(session))
    }

    /// Atomically append a turn to the session's history and persist.
    ///
    /// The turn's sequence number is assigned here, under the per-id lock,
    /// so concurrent callers always observe a gap-free, insertion-ordered
    /// history. Fails with `SessionNotFound` if the session is absent or
    /// already finished (a finished session is not mutable).
    pub async fn append_turn(&self, id: Uuid, mut turn: Turn) -> PraxisResult<Session> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let Some(mut session) = self.load(id).await? else {
            return Err(PraxisError::SessionNotFound(id));
        };
        if session.is_finished() {
            return Err(PraxisError::SessionNotFound(id));
        }

        turn.seq = session.next_seq();
        session.turns.push(turn);
        self.store.update(&session).await?;
        self.cache_put(&session).await;
        debug!(session_id = %id, turns = session.turn_count(), "turn appended");
        Ok(session)
    }

    /// Append a closing turn and mark the session finished in one critical
    /// section. Holding the per-id lock across both mutations guarantees no
    /// other turn can land between the closing turn and the status change;
    /// the closing turn is always the last one in the history.
    pub async fn append_turn_and_finish(&self, id: Uuid, mut turn: Turn) -> PraxisResult<Session> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let Some(mut session) = self.load(id).await? else {
            return Err(PraxisError::SessionNotFound(id));
        };
        if session.is_finished() {
            return Err(PraxisError::SessionNotFound(id));
        }

        turn.seq = session.next_seq();
        session.turns.push(turn);
        session.status = SessionStatus::Finished;
        self.store.update(&session).await?;
        self.cache_put(&session).await;
        info!(session_id = %id, turns = session.turn_count(), "session closed");
        Ok(session)
    }

    /// Update the session status, enforcing the monotonic transition
    /// `Active -> Finished`. Re-asserting the current status is a no-op;
    /// `Finished -> Active` fails with `InvalidTransition`.
    pub async fn set_status(&self, id: Uuid, status: SessionStatus) -> PraxisResult<Session> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let Some(mut session) = self.load(id).await? else {
            return Err(PraxisError::SessionNotFound(id));
        };
        if session.status == SessionStatus::Finished && status == SessionStatus::Active {
            warn!(session_id = %id, "rejected finished -> active transition");
            return Err(PraxisError::InvalidTransition {
                from: session.status.to_string(),
                to: status.to_string(),
            });
        }
        if session.status != status {
            session.status = status;
            self.store.update(&session).await?;
            self.cache_put(&session).await;
            info!(session_id = %id, status = %status, "session status updated");
        }
        Ok(session)
    }

    /// Remove a session and its cached copy. Returns whether a durable
    /// record existed.
    pub async fn delete(&self, id: Uuid) -> PraxisResult<bool> {
        let lock = self.lock_for(id).await;
        let existed = {
            let _guard = lock.lock().await;
            let existed = self.store.delete(id).await?;
            self.cache.lock().await.remove(&id);
            existed
        };
        // Drop the id's lock entry so deleted sessions do not accumulate.
        self.locks.lock().await.remove(&id);
        if existed {
            info!(session_id = %id, "session deleted");
        }
        Ok(existed)
    }

    /// Read-only enumeration of all sessions.
    pub async fn list(&self) -> PraxisResult<Vec<SessionSummary>> {
        self.store.list().await
    }

    /// Delete sessions older than the configured retention age and drop
    /// expired cache entries. Returns how many sessions were removed.
    ///
    /// Intended for the background maintenance schedule; it takes the same
    /// per-id locks as foreground writes, so a sweep and an in-flight
    /// `append_turn` on the same id are linearized, not interleaved.
    pub async fn sweep_expired(&self) -> PraxisResult<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.retention_max_age)
                .unwrap_or(chrono::Duration::days(30));

        let mut removed = 0;
        for summary in self.store.list().await? {
            let Some(session) = self.store.get(summary.id).await? else {
                continue;
            };
            if session.created_at < cutoff && self.delete(summary.id).await? {
                removed += 1;
            }
        }

        let now = Instant::now();
        self.cache.lock().await.retain(|_, e| e.expires_at > now);

        if removed > 0 {
            info!(removed, "swept expired sessions");
        }
        Ok(removed)
    }
}
