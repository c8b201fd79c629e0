//! Interaction intelligence (§4.9): the perception contract and the
//! deterministic, config-driven `response_type` selection procedure.
//! Extracting topics/sentiment/intent from raw text is an LLM call made
//! by the caller; this module only defines the contract and the part of
//! the pipeline that is pure arithmetic.

use pf_core::persona::ResponseStrategy;
use pf_core::Sentiment;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Quip,
    Short,
    Normal,
    Long,
    Personal,
}

impl ResponseType {
    fn parse(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "quip" => Some(Self::Quip),
            "short" => Some(Self::Short),
            "normal" => Some(Self::Normal),
            "long" => Some(Self::Long),
            "personal" => Some(Self::Personal),
            _ => None,
        }
    }
}

/// Structured perception of a piece of content, the output contract of
/// Interaction Intelligence.
#[derive(Debug, Clone)]
pub struct Perception {
    /// At most three topics.
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub intent: String,
    pub relevance_to_domain: f32,
    pub complexity: Complexity,
    pub quip_category: Option<String>,
    pub user_profile_hint: Option<String>,
    pub my_angle: String,
    pub tweet_length: usize,
    pub response_type: ResponseType,
}

struct WeightedOption {
    response_type: ResponseType,
    weight: f32,
}

/// Two-stage `response_type` selection per §4.9: a length override short
/// circuits everything; otherwise base probabilities are boosted by
/// domain relevance, renormalised, and weighted-sampled.
pub fn select_response_type(
    cfg: &ResponseStrategy,
    tweet_length: usize,
    relevance_to_domain: f32,
    rng: &mut impl Rng,
) -> ResponseType {
    if tweet_length < cfg.tweet_length_threshold {
        if let Some(forced) = ResponseType::parse(&cfg.short_text_override) {
            return forced;
        }
    }

    let base = &cfg.base_probabilities;
    let mut long = base.long;
    let mut personal = base.personal;
    if relevance_to_domain >= cfg.relevance_threshold {
        long += cfg.high_relevance_long_boost;
        personal += cfg.high_relevance_personal_boost;
    }

    let options = [
        WeightedOption { response_type: ResponseType::Quip, weight: base.quip.max(0.0) },
        WeightedOption { response_type: ResponseType::Short, weight: base.short.max(0.0) },
        WeightedOption { response_type: ResponseType::Normal, weight: base.normal.max(0.0) },
        WeightedOption { response_type: ResponseType::Long, weight: long.max(0.0) },
        WeightedOption { response_type: ResponseType::Personal, weight: personal.max(0.0) },
    ];
    let total: f32 = options.iter().map(|o| o.weight).sum();
    if total <= 0.0 {
        return ResponseType::Normal;
    }
    let mut roll = rng.random_range(0.0..total);
    for option in &options {
        if roll < option.weight {
            return option.response_type;
        }
        roll -= option.weight;
    }
    options.last().unwrap().response_type
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::persona::ResponseBaseProbabilities;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn cfg() -> ResponseStrategy {
        ResponseStrategy {
            base_probabilities: ResponseBaseProbabilities {
                quip: 0.1,
                short: 0.3,
                normal: 0.4,
                long: 0.1,
                personal: 0.1,
            },
            tweet_length_threshold: 20,
            short_text_override: "short".into(),
            high_relevance_long_boost: 0.5,
            high_relevance_personal_boost: 0.3,
            relevance_threshold: 0.7,
        }
    }

    #[test]
    fn short_text_forces_configured_override() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let rt = select_response_type(&cfg(), 5, 0.1, &mut rng);
        assert_eq!(rt, ResponseType::Short);
    }

    #[test]
    fn high_relevance_boosts_long_and_personal_selection_frequency() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut long_or_personal = 0;
        for _ in 0..500 {
            let rt = select_response_type(&cfg(), 100, 0.9, &mut rng);
            if matches!(rt, ResponseType::Long | ResponseType::Personal) {
                long_or_personal += 1;
            }
        }
        assert!(long_or_personal > 100, "got {long_or_personal}/500");
    }

    #[test]
    fn zero_total_weight_falls_back_to_normal() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut c = cfg();
        c.base_probabilities = ResponseBaseProbabilities::default();
        c.tweet_length_threshold = 0;
        c.high_relevance_long_boost = 0.0;
        c.high_relevance_personal_boost = 0.0;
        assert_eq!(select_response_type(&c, 100, 0.0, &mut rng), ResponseType::Normal);
    }
}
