use praxis_cache::{args_key, MemoCache};
use praxis_core::PraxisResult;
use std::collections::BTreeMap;
use std::time::Duration;

/// Prompt asking for a fresh clinical case. Expects `{{topic}}`,
/// `{{difficulty}}`, and `{{context}}`.
pub const CASE_TEMPLATE: &str = "\
You are a medical educator preparing a clinical case for a tutoring session.

Topic: {{topic}}
Difficulty: {{difficulty}}

Use the following reference material where relevant:
{{context}}

Write a realistic patient presentation for the student to work through.
Format your answer exactly as:

**Scenario:**
<the patient presentation, including history and initial findings>

**Final Diagnosis:**
<the single most likely diagnosis>

Do not reveal the diagnosis inside the scenario.";

/// Prompt asking the tutor for its next reply. Expects `{{scenario}}` and
/// `{{conversation_history}}`.
pub const RESPONSE_TEMPLATE: &str = "\
You are a patient in a clinical tutoring session. Stay in character and
answer only what the student asks; never volunteer the diagnosis.

Case scenario:
{{scenario}}

Conversation so far:
{{conversation_history}}

Reply as the patient.";

/// Prompt asking for a scored evaluation of the student's latest reply.
/// Expects `{{scenario}}`, `{{reference_answer}}`, and
/// `{{conversation_history}}`.
pub const EVALUATION_TEMPLATE: &str = "\
You are assessing a medical student's performance in a tutoring session.

Case scenario:
{{scenario}}

Reference diagnosis:
{{reference_answer}}

Conversation so far:
{{conversation_history}}

Score the student's work on a 0-10 scale per dimension, then decide
whether the session is complete (the student has committed to a final
diagnosis or clearly exhausted the case). Answer exactly as:

Diagnostic Reasoning Score: <0-10>
Information Gathering Score: <0-10>
Diagnosis Accuracy Score: <0-10>
Communication Score: <0-10>
End Conversation: <Yes or No>
Feedback: <two or three sentences of concrete feedback>";

/// Substitute `{{name}}` placeholders in `template` from `vars`.
/// Unknown placeholders are left in place.
pub fn render_template(template: &str, vars: &BTreeMap<&str, &str>) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }
    out
}

/// Memoized template rendering.
///
/// Rendering is cheap, but the rendered prompt is the memo key for the
/// much more expensive completion behind it, so identical (template, vars)
/// pairs must produce byte-identical prompts. Keys hash the template name
/// with the variables in sorted order.
pub struct PromptCache {
    rendered: MemoCache<String>,
}

impl PromptCache {
    /// Create a cache with the given entry TTL and capacity.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            rendered: MemoCache::new("prompts", ttl, capacity),
        }
    }

    /// Render `template` with `vars`, reusing a cached rendering when the
    /// same name and variables were seen before.
    pub async fn render(
        &self,
        name: &str,
        template: &str,
        vars: &BTreeMap<&str, &str>,
    ) -> PraxisResult<String> {
        let mut parts: Vec<&str> = vec![name];
        for (k, v) in vars {
            parts.push(k);
            parts.push(v);
        }
        let key = args_key(&parts);
        self.rendered
            .get_or_compute(&key, || async { Ok(render_template(template, vars)) })
            .await
    }

    /// Drop expired cached renderings. Returns how many were removed.
    pub async fn evict_expired(&self) -> usize {
        self.rendered.evict_expired().await
    }
}

impl Default for PromptCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), 128)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let vars = BTreeMap::from([("topic", "cardiology"), ("difficulty", "hard")]);
        let out = render_template("{{topic}} at {{difficulty}} ({{topic}})", &vars);
        assert_eq!(out, "cardiology at hard (cardiology)");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let vars = BTreeMap::from([("topic", "renal")]);
        let out = render_template("{{topic}} {{missing}}", &vars);
        assert_eq!(out, "renal {{missing}}");
    }

    #[test]
    fn test_case_template_has_expected_placeholders() {
        for name in ["{{topic}}", "{{difficulty}}", "{{context}}"] {
            assert!(CASE_TEMPLATE.contains(name));
        }
        assert!(CASE_TEMPLATE.contains("**Final Diagnosis:**"));
    }

    #[tokio::test]
    async fn test_cache_returns_identical_rendering() {
        let cache = PromptCache::default();
        let vars = BTreeMap::from([("scenario", "chest pain"), ("conversation_history", "")]);

        let a = cache
            .render("response", RESPONSE_TEMPLATE, &vars)
            .await
            .unwrap();
        let b = cache
            .render("response", RESPONSE_TEMPLATE, &vars)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert!(a.contains("chest pain"));
    }

    #[tokio::test]
    async fn test_cache_distinguishes_variable_values() {
        let cache = PromptCache::default();
        let a = cache
            .render(
                "case",
                CASE_TEMPLATE,
                &BTreeMap::from([("topic", "cardiology"), ("difficulty", "easy"), ("context", "")]),
            )
            .await
            .unwrap();
        let b = cache
            .render(
                "case",
                CASE_TEMPLATE,
                &BTreeMap::from([("topic", "neurology"), ("difficulty", "easy"), ("context", "")]),
            )
            .await
            .unwrap();
        assert_ne!(a, b);
    }
}
