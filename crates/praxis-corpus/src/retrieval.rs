use crate::fingerprint::FingerprintTracker;
use async_trait::async_trait;
use praxis_core::{PraxisError, PraxisResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// One ranked passage returned by the search provider.
#[derive(Debug, Clone)]
pub struct Passage {
    /// Passage text.
    pub content: String,
    /// Provider-defined relevance score, higher is better.
    pub score: f32,
}

/// External semantic-search collaborator.
///
/// The engine only depends on this seam; FAISS, a vector database, or an
/// in-process index all fit behind it.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Rebuild the derived index from the documents under `corpus`.
    async fn rebuild(&self, corpus: &Path) -> PraxisResult<()>;

    /// Return the `top_k` passages most relevant to `query`.
    async fn search(&self, query: &str, top_k: usize) -> PraxisResult<Vec<Passage>>;
}

/// Freshness-aware retrieval over a document corpus.
///
/// Composes a [`FingerprintTracker`] with a [`SimilaritySearch`] provider:
/// the index is rebuilt only when the fingerprints say the corpus moved,
/// and the manifest is recorded only after a successful rebuild.
pub struct ContextRetriever {
    corpus_path: PathBuf,
    tracker: FingerprintTracker,
    search: Arc<dyn SimilaritySearch>,
    top_k: usize,
}

impl ContextRetriever {
    /// Create a retriever over `corpus_path` with the given search provider.
    /// The fingerprint manifest lives at `manifest_path`.
    pub fn new(
        corpus_path: impl Into<PathBuf>,
        manifest_path: impl Into<PathBuf>,
        search: Arc<dyn SimilaritySearch>,
    ) -> Self {
        let corpus_path = corpus_path.into();
        Self {
            tracker: FingerprintTracker::new(corpus_path.clone(), manifest_path),
            corpus_path,
            search,
            top_k: 5,
        }
    }

    /// Number of passages fetched per query (default 5).
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Rebuild the index if the corpus changed since the last recorded build.
    ///
    /// An unreadable corpus is treated as stale: the rebuild is still
    /// attempted, and the `CorpusUnavailable` condition is surfaced only if
    /// the rebuild fails too.
    pub async fn ensure_fresh(&self) -> PraxisResult<()> {
        match self.tracker.is_stale().await {
            Ok(false) => Ok(()),
            Ok(true) => {
                info!(corpus = %self.corpus_path.display(), "corpus changed, rebuilding index");
                self.search.rebuild(&self.corpus_path).await?;
                self.tracker.record().await?;
                Ok(())
            }
            Err(PraxisError::CorpusUnavailable(reason)) => {
                warn!(%reason, "corpus unreadable, attempting rebuild anyway");
                self.search
                    .rebuild(&self.corpus_path)
                    .await
                    .map_err(|_| PraxisError::CorpusUnavailable(reason))
                // No record(): fingerprints could not be computed, so the
                // next check stays conservative.
            }
            Err(e) => Err(e),
        }
    }

    /// Retrieve relevant context for `query`, joined into one block.
    pub async fn retrieve(&self, query: &str) -> PraxisResult<String> {
        let passages = self.search.search(query, self.top_k).await?;
        Ok(passages
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
