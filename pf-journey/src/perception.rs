//! Interaction Intelligence's perception half (§4.9): an LLM call that
//! extracts topics/sentiment/intent from text, falling back to a plain
//! heuristic on an unparseable response per §7 rule 4.

use std::sync::Arc;

use pf_behavior::{select_response_type, Complexity, Perception};
use pf_core::persona::ResponseStrategy;
use pf_core::text::weighted_length;
use pf_core::Sentiment;
use pf_llm::LlmProvider;
use rand::Rng;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
struct PerceptionRaw {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    intent: String,
    #[serde(default)]
    relevance_to_domain: f32,
    #[serde(default)]
    complexity: String,
    #[serde(default)]
    quip_category: Option<String>,
    #[serde(default)]
    user_profile_hint: Option<String>,
    #[serde(default)]
    my_angle: String,
}

fn parse_sentiment(label: &str) -> Sentiment {
    match label.to_lowercase().as_str() {
        "positive" => Sentiment::Positive,
        "negative" => Sentiment::Negative,
        _ => Sentiment::Neutral,
    }
}

fn parse_complexity(label: &str) -> Complexity {
    match label.to_lowercase().as_str() {
        "simple" => Complexity::Simple,
        "complex" => Complexity::Complex,
        _ => Complexity::Moderate,
    }
}

pub struct InteractionIntelligence {
    llm: Arc<dyn LlmProvider>,
}

impl InteractionIntelligence {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn perceive(
        &self,
        text: &str,
        handle: &str,
        response_strategy: &ResponseStrategy,
        rng: &mut impl Rng,
    ) -> Perception {
        let prompt = format!(
            "Analyse this social post from @{handle}:\n{text}\n\n\
             Reply with JSON: {{\"topics\": [string, up to 3], \"sentiment\": \"positive\"|\"neutral\"|\"negative\", \
             \"intent\": string, \"relevance_to_domain\": float 0-1, \"complexity\": \"simple\"|\"moderate\"|\"complex\", \
             \"quip_category\": string or null, \"user_profile_hint\": string or null, \"my_angle\": string}}."
        );
        let raw_response = self
            .llm
            .generate(&prompt, Some("You are a careful social-media perception module."), None)
            .await
            .unwrap_or_default();
        let parsed = parse_raw(&raw_response).unwrap_or_else(|| heuristic_fallback(text));

        let tweet_length = weighted_length(text);
        let response_type = select_response_type(response_strategy, tweet_length, parsed.relevance_to_domain, rng);

        Perception {
            topics: parsed.topics.into_iter().take(3).collect(),
            sentiment: parse_sentiment(&parsed.sentiment),
            intent: parsed.intent,
            relevance_to_domain: parsed.relevance_to_domain.clamp(0.0, 1.0),
            complexity: parse_complexity(&parsed.complexity),
            quip_category: parsed.quip_category,
            user_profile_hint: parsed.user_profile_hint,
            my_angle: parsed.my_angle,
            tweet_length,
            response_type,
        }
    }
}

fn parse_raw(raw: &str) -> Option<PerceptionRaw> {
    let json_slice = raw.find('{').and_then(|start| raw.rfind('}').map(|end| &raw[start..=end]))?;
    serde_json::from_str(json_slice).ok()
}

/// Per §7 rule 4: an unparseable LLM response falls back to a neutral,
/// low-relevance heuristic rather than aborting the scenario.
fn heuristic_fallback(text: &str) -> PerceptionRaw {
    PerceptionRaw {
        topics: vec![],
        sentiment: "neutral".to_string(),
        intent: "unknown".to_string(),
        relevance_to_domain: 0.1,
        complexity: if text.split_whitespace().count() > 30 { "complex" } else { "simple" }.to_string(),
        quip_category: None,
        user_profile_hint: None,
        my_angle: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct ScriptedLlm(String);

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn generate(&self, _prompt: &str, _system_prompt: Option<&str>, _model: Option<&str>) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn parses_well_formed_perception_json() {
        let llm = Arc::new(ScriptedLlm(
            r#"{"topics": ["kimchi", "fermentation"], "sentiment": "positive", "intent": "share_opinion", "relevance_to_domain": 0.8, "complexity": "moderate", "quip_category": "agreement", "user_profile_hint": "foodie", "my_angle": "love this"}"#
                .to_string(),
        ));
        let intel = InteractionIntelligence::new(llm);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let perception = intel
            .perceive("kimchi is amazing", "foodie99", &ResponseStrategy::default(), &mut rng)
            .await;
        assert_eq!(perception.topics, vec!["kimchi".to_string(), "fermentation".to_string()]);
        assert_eq!(perception.sentiment, Sentiment::Positive);
    }

    #[tokio::test]
    async fn falls_back_to_heuristic_on_garbage_response() {
        let llm = Arc::new(ScriptedLlm("garbage, not json".to_string()));
        let intel = InteractionIntelligence::new(llm);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let perception = intel
            .perceive("short text", "someone", &ResponseStrategy::default(), &mut rng)
            .await;
        assert_eq!(perception.sentiment, Sentiment::Neutral);
        assert!(perception.topics.is_empty());
    }
}
