//! Core types and error definitions for the Praxis tutoring-session engine.
//!
//! This crate provides the foundational types shared across all Praxis crates,
//! including the error taxonomy, turn representations, and the case context
//! that anchors a tutoring session.
//!
//! # Main types
//!
//! - [`PraxisError`] — Unified error enum for all Praxis subsystems.
//! - [`PraxisResult`] — Convenience alias for `Result<T, PraxisError>`.
//! - [`Role`] — Turn author (student or tutor).
//! - [`Turn`] — A single admitted exchange within a session.
//! - [`CaseContext`] — The generated scenario and its reference answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the Praxis engine.
///
/// Each variant corresponds to a failure class callers can act on. Variants
/// carry a human-readable reason; the variant itself is the machine-readable
/// kind.
#[derive(Debug, thiserror::Error)]
pub enum PraxisError {
    /// The requested session id is unknown or no longer mutable.
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// Submitted content was blocked by the safety gate.
    #[error("Content rejected by safety gate: {0}")]
    SecurityRejected(String),

    /// A session status transition that the state machine forbids.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the session was in.
        from: String,
        /// Status the caller attempted to move to.
        to: String,
    },

    /// An external collaborator (generation, safety analysis, search) failed.
    #[error("Compute error: {0}")]
    Compute(String),

    /// The document corpus could not be read for fingerprinting.
    #[error("Corpus unavailable: {0}")]
    CorpusUnavailable(String),

    /// An error related to session persistence or lookup.
    #[error("Session error: {0}")]
    Session(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`PraxisError`].
pub type PraxisResult<T> = Result<T, PraxisError>;

// --- Turn types ---

/// The role of the participant that authored a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The learner replying to the scenario.
    Student,
    /// The generated tutor side of the exchange.
    Tutor,
}

/// A single admitted exchange within a tutoring session.
///
/// Turns are immutable once appended; `seq` increases monotonically within
/// a session and records insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique identifier for this turn.
    pub id: Uuid,
    /// The role of the turn author.
    pub role: Role,
    /// The textual content of the turn.
    pub content: String,
    /// Position of this turn within its session, starting at 0.
    pub seq: u32,
    /// UTC timestamp of when the turn was created.
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Creates a new turn with the given role, content, and sequence number.
    pub fn new(role: Role, content: impl Into<String>, seq: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            seq,
            created_at: Utc::now(),
        }
    }

    /// Creates a new turn with [`Role::Student`].
    pub fn student(content: impl Into<String>, seq: u32) -> Self {
        Self::new(Role::Student, content, seq)
    }

    /// Creates a new turn with [`Role::Tutor`].
    pub fn tutor(content: impl Into<String>, seq: u32) -> Self {
        Self::new(Role::Tutor, content, seq)
    }
}

// --- Case context ---

/// The generated scenario a session revolves around, plus the reference
/// answer the evaluator scores against. Not shown to the student.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseContext {
    /// The scenario text presented over the course of the session.
    pub scenario: String,
    /// The expected final answer for the scenario.
    pub reference_answer: String,
}

impl CaseContext {
    /// Creates a case context from a scenario and its reference answer.
    pub fn new(scenario: impl Into<String>, reference_answer: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            reference_answer: reference_answer.into(),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Reads the filter from `RUST_LOG`, defaulting to `info`. Safe to call once
/// at process startup; later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_creation() {
        let turn = Turn::student("I think it is pneumonia", 3);
        assert_eq!(turn.role, Role::Student);
        assert_eq!(turn.content, "I think it is pneumonia");
        assert_eq!(turn.seq, 3);
    }

    #[test]
    fn test_turn_serialization_round_trip() {
        let turn = Turn::tutor("What else would you examine?", 0);
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, turn.content);
        assert_eq!(back.role, Role::Tutor);
        assert_eq!(back.seq, 0);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Student).unwrap(), "\"student\"");
        assert_eq!(serde_json::to_string(&Role::Tutor).unwrap(), "\"tutor\"");
    }

    #[test]
    fn test_error_display_includes_reason() {
        let err = PraxisError::SecurityRejected("sensitive keyword".into());
        assert!(err.to_string().contains("sensitive keyword"));
    }
}
