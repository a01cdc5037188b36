use chrono::{DateTime, Utc};
use praxis_core::{CaseContext, Turn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a session. Transitions only `Active -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// The session accepts new turns.
    Active,
    /// Terminal. The session is read-only.
    Finished,
}

/// The durable record of one tutoring session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Globally unique session identifier.
    pub id: Uuid,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// The generated case, absent only before generation completes.
    #[serde(default)]
    pub case: Option<CaseContext>,
    /// Append-only turn history, ordered by insertion.
    pub turns: Vec<Turn>,
    /// UTC timestamp of record creation.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Creates an active session with a fresh id and no turns.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: SessionStatus::Active,
            case: None,
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Sequence number the next appended turn should carry.
    pub fn next_seq(&self) -> u32 {
        self.turns.len() as u32
    }

    /// Number of turns in the history.
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Whether the session has reached its terminal status.
    pub fn is_finished(&self) -> bool {
        self.status == SessionStatus::Finished
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Finished => write!(f, "finished"),
        }
    }
}

/// Id and status pair returned by enumeration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// The session id.
    pub id: Uuid,
    /// The session's current status.
    pub status: SessionStatus,
}
