//! Corpus freshness tracking and the similarity-search seam.
//!
//! A derived search index is only valid while the source documents it was
//! built from are unchanged. [`FingerprintTracker`] detects change cheaply
//! (path, size, modified-time) without hashing file contents;
//! [`ContextRetriever`] uses it to rebuild the external index only when
//! something actually moved.

/// Fingerprint computation and the persisted manifest.
pub mod fingerprint;
/// Search-provider trait and the freshness-aware retriever.
pub mod retrieval;

pub use fingerprint::{FileFingerprint, FingerprintTracker, Manifest};
pub use retrieval::{ContextRetriever, Passage, SimilaritySearch};
