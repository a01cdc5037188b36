use crate::session::{Session, SessionSummary};
use async_trait::async_trait;
use praxis_core::{PraxisError, PraxisResult};
use std::path::PathBuf;
use uuid::Uuid;

/// Keyed read/write access to durable session records.
///
/// Single-record atomicity is all a backend must provide; ordering across
/// sessions and per-id serialization live in the manager above this trait.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session record.
    async fn create(&self, session: &Session) -> PraxisResult<()>;
    /// Read a session record, `None` if absent.
    async fn get(&self, id: Uuid) -> PraxisResult<Option<Session>>;
    /// Overwrite an existing session record.
    async fn update(&self, session: &Session) -> PraxisResult<()>;
    /// Remove a session record. Returns whether a record existed.
    async fn delete(&self, id: Uuid) -> PraxisResult<bool>;
    /// Enumerate all records as id/status summaries.
    async fn list(&self) -> PraxisResult<Vec<SessionSummary>>;
}

/// File-based session store: one pretty-printed JSON file per session id.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn new(dir: PathBuf) -> PraxisResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, session: &Session) -> PraxisResult<()> {
        let path = self.session_path(session.id);
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> PraxisResult<Option<Session>> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let session: Session = serde_json::from_str(&data)
            .map_err(|e| PraxisError::Session(format!("Failed to parse session {id}: {e}")))?;
        Ok(Some(session))
    }

    async fn update(&self, session: &Session) -> PraxisResult<()> {
        self.create(session).await
    }

    async fn delete(&self, id: Uuid) -> PraxisResult<bool> {
        let path = self.session_path(id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn list(&self) -> PraxisResult<Vec<SessionSummary>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            let Ok(id) = Uuid::parse_str(stem) else {
                continue;
            };
            if let Some(session) = self.get(id).await? {
                summaries.push(SessionSummary {
                    id,
                    status: session.status,
                });
            }
        }
        Ok(summaries)
    }
}
