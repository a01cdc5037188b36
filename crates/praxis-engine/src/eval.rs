use serde::{Deserialize, Serialize};
use tracing::debug;

/// Score dimensions reported by the evaluation prompt, in display order.
const DIMENSIONS: &[&str] = &[
    "Diagnostic Reasoning",
    "Information Gathering",
    "Diagnosis Accuracy",
    "Communication",
];

const DEFAULT_SCORE: f64 = 5.0;
// Whole-extraction failure only; a merely absent feedback label gets the
// softer NO_FEEDBACK message.
const FALLBACK_RATIONALE: &str = "evaluation could not be parsed";
const NO_FEEDBACK: &str = "no feedback provided";

/// Structured result of one evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    /// Per-dimension scores on a 0..=10 scale, keyed by dimension name.
    pub scores: Vec<(String, f64)>,
    /// Mean of the dimension scores normalized to 0..=1.
    pub overall: f64,
    /// Whether the evaluator decided the session should end.
    pub is_end: bool,
    /// Free-text feedback extracted from the evaluator output.
    pub rationale: String,
}

impl Evaluation {
    /// Score for a single dimension, if present.
    pub fn score(&self, dimension: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|(name, _)| name == dimension)
            .map(|(_, v)| *v)
    }
}

/// Extracts scores and a continue/stop decision from evaluator output.
///
/// The evaluator model is asked for labeled lines such as
/// `Diagnostic Reasoning Score: 8` but its output is only
/// semi-structured. Extraction is therefore forgiving: labels match
/// case-insensitively, a missing or unparseable score falls back to the
/// midpoint, and out-of-range values are clamped. Extraction never fails;
/// completely unusable input yields a neutral [`Evaluation`].
#[derive(Debug, Clone, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Create an evaluator with the standard dimension set.
    pub fn new() -> Self {
        Self
    }

    /// Extract an [`Evaluation`] from raw evaluator output.
    pub fn extract(&self, raw: &str) -> Evaluation {
        if raw.trim().is_empty() {
            debug!("empty evaluator output, using neutral scores");
            return self.fallback();
        }

        let lowered = raw.to_lowercase();
        let mut scores = Vec::with_capacity(DIMENSIONS.len());
        for dim in DIMENSIONS {
            let label = format!("{} score:", dim.to_lowercase());
            let value = labeled_value(raw, &lowered, &label)
                .and_then(|v| v.parse::<f64>().ok())
                .map_or(DEFAULT_SCORE, |v| v.clamp(0.0, 10.0));
            scores.push(((*dim).to_string(), value));
        }

        let sum: f64 = scores.iter().map(|(_, v)| v).sum();
        let overall = sum / scores.len() as f64 / 10.0;

        let is_end = labeled_value(raw, &lowered, "end conversation:")
            .map(|v| {
                let v = v.to_lowercase();
                v.contains("yes") || v.contains("true")
            })
            .unwrap_or(false);

        let rationale =
            labeled_tail(raw, &lowered, "feedback:").unwrap_or_else(|| NO_FEEDBACK.to_string());

        Evaluation {
            scores,
            overall,
            is_end,
            rationale,
        }
    }

    fn fallback(&self) -> Evaluation {
        let scores: Vec<(String, f64)> = DIMENSIONS
            .iter()
            .map(|d| ((*d).to_string(), DEFAULT_SCORE))
            .collect();
        Evaluation {
            scores,
            overall: DEFAULT_SCORE / 10.0,
            is_end: false,
            rationale: FALLBACK_RATIONALE.to_string(),
        }
    }
}

/// Value following `label` up to the end of its line. `lowered` must be the
/// lowercased copy of `raw`; the label is matched against it so byte offsets
/// line up.
fn labeled_value(raw: &str, lowered: &str, label: &str) -> Option<String> {
    let start = lowered.find(label)? + label.len();
    // Offsets can drift if lowercasing changed a multi-byte character
    // earlier in the text; a non-boundary slice just means no match.
    let rest = raw.get(start..)?;
    let line = rest.lines().next().unwrap_or("");
    let value = line.trim().trim_matches(|c| c == '*' || c == '`').trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Everything following `label`, trimmed. Used for the free-text feedback
/// block, which runs to the end of the output.
fn labeled_tail(raw: &str, lowered: &str, label: &str) -> Option<String> {
    let start = lowered.find(label)? + label.len();
    let tail = raw.get(start..)?.trim();
    if tail.is_empty() {
        None
    } else {
        Some(tail.to_string())
    }
}
