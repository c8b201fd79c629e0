//! EngagementJudge (§4.13 step 3): a structured LLM call that decides
//! independent like/repost/reply booleans for one piece of content.

use std::sync::Arc;

use pf_llm::LlmProvider;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EngagementDecision {
    #[serde(default)]
    pub like: bool,
    #[serde(default)]
    pub repost: bool,
    #[serde(default)]
    pub reply: bool,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub reply_type: Option<String>,
}

impl EngagementDecision {
    /// Per §7 rule 4: an LLM-format error falls back to a simple
    /// `skip` heuristic rather than aborting the scenario.
    fn fallback(reason: &str) -> Self {
        Self {
            like: false,
            repost: false,
            reply: false,
            confidence: 0.0,
            reason: reason.to_string(),
            reply_type: None,
        }
    }
}

pub struct EngagementJudge {
    llm: Arc<dyn LlmProvider>,
}

impl EngagementJudge {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn judge(&self, post_text: &str, persona_context: &str) -> EngagementDecision {
        let prompt = format!(
            "Persona context:\n{persona_context}\n\nPost:\n{post_text}\n\n\
             Reply with a JSON object: {{\"like\": bool, \"repost\": bool, \"reply\": bool, \
             \"confidence\": float 0-1, \"reason\": string, \"reply_type\": string or null}}."
        );
        let raw = match self.llm.generate(&prompt, Some("You are an engagement judge."), None).await {
            Ok(text) => text,
            Err(_) => return EngagementDecision::fallback("llm call failed"),
        };
        parse_decision(&raw)
    }
}

fn parse_decision(raw: &str) -> EngagementDecision {
    let json_slice = raw
        .find('{')
        .and_then(|start| raw.rfind('}').map(|end| &raw[start..=end]))
        .unwrap_or(raw);
    serde_json::from_str(json_slice).unwrap_or_else(|_| EngagementDecision::fallback("unparseable llm response"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct ScriptedLlm(String);

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn generate(&self, _prompt: &str, _system_prompt: Option<&str>, _model: Option<&str>) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn parses_well_formed_json_response() {
        let llm = Arc::new(ScriptedLlm(
            r#"sure, here: {"like": true, "repost": false, "reply": true, "confidence": 0.9, "reason": "relevant", "reply_type": "short"}"#
                .to_string(),
        ));
        let judge = EngagementJudge::new(llm);
        let decision = judge.judge("post text", "persona context").await;
        assert!(decision.like);
        assert!(decision.reply);
        assert!(!decision.repost);
        assert_eq!(decision.reply_type.as_deref(), Some("short"));
    }

    #[tokio::test]
    async fn malformed_response_falls_back_to_skip_heuristic() {
        let llm = Arc::new(ScriptedLlm("not json at all".to_string()));
        let judge = EngagementJudge::new(llm);
        let decision = judge.judge("post text", "persona context").await;
        assert!(!decision.like && !decision.repost && !decision.reply);
    }
}
