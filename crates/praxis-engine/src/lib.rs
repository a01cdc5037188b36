//! The Praxis turn protocol and its supporting pieces.
//!
//! A session is a gated, scored exchange: every submitted reply passes the
//! [`SafetyGate`] before it is admitted, the [`Evaluator`] turns the
//! evaluation completion into numeric scores and a continue/stop decision,
//! and [`TutorEngine`] drives the session from active to finished over the
//! session store.
//!
//! External collaborators (completion and safety-analysis providers) are
//! consumed through the traits in [`providers`]; nothing in this crate
//! talks to a network.

/// Evaluation extraction from semi-structured evaluator output.
pub mod eval;
/// Prompt templates and memoized rendering.
pub mod prompts;
/// The turn protocol state machine.
pub mod protocol;
/// External collaborator traits.
pub mod providers;
/// The combined local + provider safety gate.
pub mod safety;

pub use eval::{Evaluation, Evaluator};
pub use prompts::PromptCache;
pub use providers::{CompletionParams, GenerationProvider, SafetyProvider, Verdict};
pub use protocol::{CaseRequest, EngineConfig, StartedSession, TurnOutcome, TutorEngine};
pub use safety::SafetyGate;
