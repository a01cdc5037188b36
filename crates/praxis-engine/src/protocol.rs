use crate::eval::Evaluator;
use crate::prompts::{self, PromptCache};
use crate::providers::{retry_once, CompletionParams, GenerationProvider};
use crate::safety::SafetyGate;
use praxis_cache::{args_key, MemoCache};
use praxis_core::{CaseContext, PraxisError, PraxisResult, Role, Turn};
use praxis_corpus::ContextRetriever;
use praxis_session::{SessionManager, SessionSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// What a new session should be about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRequest {
    /// Subject area for the generated case.
    pub topic: String,
    /// Requested difficulty, free-form (e.g. "easy", "intermediate").
    pub difficulty: String,
}

/// Tuning knobs for [`TutorEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL for memoized completion results.
    pub completion_ttl: Duration,
    /// Capacity of the completion memo cache.
    pub completion_capacity: usize,
    /// Sampling parameters used for every completion call.
    pub params: CompletionParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            completion_ttl: Duration::from_secs(3600),
            completion_capacity: 512,
            params: CompletionParams::default(),
        }
    }
}

/// Result of [`TutorEngine::start_session`].
#[derive(Debug, Clone)]
pub struct StartedSession {
    /// Id of the newly created session.
    pub session_id: Uuid,
    /// History so far: the opening tutor turn.
    pub turns: Vec<Turn>,
    /// Always false at creation; present so start and submit responses
    /// share a shape at the request layer.
    pub is_finished: bool,
}

/// Result of one [`TutorEngine::submit_turn`] round.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Full admitted history after this round.
    pub turns: Vec<Turn>,
    /// Overall score for the student's reply, on a 0..=1 scale.
    pub score: f64,
    /// Whether the evaluator ended the session this round.
    pub is_finished: bool,
}

/// Drives the tutoring-session turn protocol.
///
/// One round of [`submit_turn`](TutorEngine::submit_turn) gates the
/// student's reply, appends it, runs the evaluation and the tutor's next
/// reply concurrently, and finishes the session when the evaluator says the
/// case is complete. Completions are memoized so a resubmitted identical
/// round does not hit the generation provider twice.
pub struct TutorEngine {
    sessions: Arc<SessionManager>,
    generator: Arc<dyn GenerationProvider>,
    gate: SafetyGate,
    retriever: Arc<ContextRetriever>,
    completions: MemoCache<String>,
    prompts: PromptCache,
    evaluator: Evaluator,
    params: CompletionParams,
}

impl TutorEngine {
    /// Assemble the engine from its collaborators.
    pub fn new(
        sessions: Arc<SessionManager>,
        generator: Arc<dyn GenerationProvider>,
        gate: SafetyGate,
        retriever: Arc<ContextRetriever>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sessions,
            generator,
            gate,
            retriever,
            completions: MemoCache::new(
                "completions",
                config.completion_ttl,
                config.completion_capacity,
            ),
            prompts: PromptCache::default(),
            evaluator: Evaluator::new(),
            params: config.params,
        }
    }

    /// Memoized, retried completion call. Errors are never cached, so a
    /// failed round can be resubmitted as soon as the provider recovers.
    async fn complete(&self, prompt: &str) -> PraxisResult<String> {
        let key = args_key(&[
            "complete",
            prompt,
            &format!("{:.2}", self.params.temperature),
            &self.params.max_tokens.to_string(),
        ]);
        self.completions
            .get_or_compute(&key, || async {
                retry_once(|| self.generator.complete(prompt, &self.params)).await
            })
            .await
    }

    /// Generate a case and open a session around it.
    ///
    /// Corpus retrieval is best-effort: a failed index refresh or search
    /// degrades to an uncontextualized case rather than blocking the start.
    pub async fn start_session(&self, request: &CaseRequest) -> PraxisResult<StartedSession> {
        let context = match self.retriever.ensure_fresh().await {
            Ok(()) => self
                .retriever
                .retrieve(&request.topic)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "context retrieval failed, generating without it");
                    String::new()
                }),
            Err(e) => {
                warn!(error = %e, "corpus refresh failed, generating without context");
                String::new()
            }
        };

        let prompt = self
            .prompts
            .render(
                "case",
                prompts::CASE_TEMPLATE,
                &BTreeMap::from([
                    ("topic", request.topic.as_str()),
                    ("difficulty", request.difficulty.as_str()),
                    ("context", context.as_str()),
                ]),
            )
            .await?;
        let case = split_case(&self.complete(&prompt).await?);

        let session = self.sessions.create(Some(case.clone())).await?;

        let opening_prompt = self
            .prompts
            .render(
                "response",
                prompts::RESPONSE_TEMPLATE,
                &BTreeMap::from([
                    ("scenario", case.scenario.as_str()),
                    ("conversation_history", "(the session is just beginning)"),
                ]),
            )
            .await?;
        let opening = self.complete(&opening_prompt).await?;
        let session = self
            .sessions
            .append_turn(session.id, Turn::tutor(opening, 0))
            .await?;

        info!(session_id = %session.id, topic = %request.topic, "session started");
        Ok(StartedSession {
            session_id: session.id,
            turns: session.turns,
            is_finished: false,
        })
    }

    /// Run one round of the turn protocol for `session_id`.
    ///
    /// The reply must pass the safety gate before anything is recorded; a
    /// rejected reply leaves the session exactly as it was. Evaluation and
    /// the tutor's next reply run concurrently once the student turn is
    /// admitted.
    pub async fn submit_turn(&self, session_id: Uuid, reply: &str) -> PraxisResult<TurnOutcome> {
        let session = self
            .sessions
            .load(session_id)
            .await?
            .ok_or(PraxisError::SessionNotFound(session_id))?;
        if session.is_finished() {
            return Err(PraxisError::SessionNotFound(session_id));
        }
        let case = session.case.clone().unwrap_or_default();

        self.gate.check(reply).await?;

        let session = self
            .sessions
            .append_turn(session_id, Turn::student(reply, 0))
            .await?;
        let history = conversation_history(&session.turns);

        let eval_prompt = self
            .prompts
            .render(
                "evaluation",
                prompts::EVALUATION_TEMPLATE,
                &BTreeMap::from([
                    ("scenario", case.scenario.as_str()),
                    ("reference_answer", case.reference_answer.as_str()),
                    ("conversation_history", history.as_str()),
                ]),
            )
            .await?;
        let response_prompt = self
            .prompts
            .render(
                "response",
                prompts::RESPONSE_TEMPLATE,
                &BTreeMap::from([
                    ("scenario", case.scenario.as_str()),
                    ("conversation_history", history.as_str()),
                ]),
            )
            .await?;

        let (eval_raw, mut tutor_reply) =
            tokio::try_join!(self.complete(&eval_prompt), self.complete(&response_prompt))?;
        let evaluation = self.evaluator.extract(&eval_raw);

        if evaluation.is_end {
            tutor_reply.push_str(&format!(
                "\n\n**Session Summary**\nYour final score: {:.2}/1.0\n\n**Feedback**:\n{}",
                evaluation.overall, evaluation.rationale
            ));
        }

        // Closing turn and finished status must commit together; a separate
        // set_status would let a racing submit slip a turn in between.
        let session = if evaluation.is_end {
            let session = self
                .sessions
                .append_turn_and_finish(session_id, Turn::tutor(tutor_reply, 0))
                .await?;
            info!(session_id = %session_id, score = evaluation.overall, "session finished");
            session
        } else {
            self.sessions
                .append_turn(session_id, Turn::tutor(tutor_reply, 0))
                .await?
        };

        Ok(TurnOutcome {
            turns: session.turns,
            score: evaluation.overall,
            is_finished: evaluation.is_end,
        })
    }

    /// Enumerate all stored sessions.
    pub async fn list_sessions(&self) -> PraxisResult<Vec<SessionSummary>> {
        self.sessions.list().await
    }

    /// Delete a session. Returns whether it existed.
    pub async fn delete_session(&self, session_id: Uuid) -> PraxisResult<bool> {
        self.sessions.delete(session_id).await
    }

    /// One pass of background maintenance: retention sweep plus expired
    /// cache entries across the engine.
    pub async fn run_maintenance_once(&self) -> PraxisResult<usize> {
        let removed = self.sessions.sweep_expired().await?;
        self.completions.evict_expired().await;
        self.prompts.evict_expired().await;
        self.gate.evict_expired().await;
        Ok(removed)
    }

    /// Run [`run_maintenance_once`](Self::run_maintenance_once) on a fixed
    /// interval until the returned handle is aborted.
    pub fn spawn_maintenance(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.run_maintenance_once().await {
                    warn!(error = %e, "maintenance pass failed");
                }
            }
        })
    }
}

/// Split generated case text into scenario and reference diagnosis.
///
/// The generation prompt asks for a `**Final Diagnosis:**` marker but the
/// output is only semi-structured, so the plain form is accepted too. Text
/// with no marker at all becomes the scenario with an unspecified answer.
fn split_case(raw: &str) -> CaseContext {
    for marker in ["**Final Diagnosis:**", "Final Diagnosis:"] {
        if let Some((scenario, diagnosis)) = raw.split_once(marker) {
            let scenario = scenario
                .trim()
                .trim_start_matches("**Scenario:**")
                .trim()
                .to_string();
            return CaseContext::new(scenario, diagnosis.trim());
        }
    }
    warn!("generated case has no diagnosis marker");
    CaseContext::new(raw.trim(), "not specified")
}

/// Render the admitted history as labeled lines for the prompts.
fn conversation_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let who = match t.role {
                Role::Student => "Student",
                Role::Tutor => "Tutor",
            };
            format!("{who}: {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
