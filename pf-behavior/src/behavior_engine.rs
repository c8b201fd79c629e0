//! Behavior engine (§4.8): turns a perceived candidate into a
//! like/repost/comment decision, or a SKIP with a human-readable reason.

use pf_core::persona::{InteractionPatterns, ProbabilityModel};
use pf_core::{RelationshipTier, Sentiment};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub topic: String,
    pub sentiment: Sentiment,
    pub relevance_to_domain: f32,
    pub relationship: RelationshipTier,
}

/// Per-candidate session context the engine needs but does not own.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionState {
    pub aggressive_mode: bool,
    pub daily_user_interaction_count: u32,
    pub user_in_cooldown: bool,
    pub post_comment_count: u32,
    pub daily_total_count: u32,
    pub daily_total_cap: u32,
}

#[derive(Debug, Clone)]
pub enum Decision {
    Skip { reason: String },
    Interact { like: bool, repost: bool, comment: bool },
}

/// Owns the running mood state across a session; everything else is
/// pure configuration pulled from the persona's `behavior` block.
pub struct BehaviorEngine {
    patterns: InteractionPatterns,
    probability_model: ProbabilityModel,
    mood: f32,
}

const LOW_MOOD_THRESHOLD: f32 = 0.25;

impl BehaviorEngine {
    pub fn new(patterns: InteractionPatterns, probability_model: ProbabilityModel) -> Self {
        let mood = patterns.mood_volatility.base_mood;
        Self {
            patterns,
            probability_model,
            mood,
        }
    }

    pub fn mood(&self) -> f32 {
        self.mood
    }

    /// Recomputes mood per §4.8: `base + time_factor + recent_sentiment_impact
    /// + random_jitter`, clamped to [0, 1].
    pub fn refresh_mood(&mut self, time_factor: f32, recent_sentiment_impact: f32, rng: &mut impl Rng) {
        let factors = &self.patterns.mood_volatility.factors;
        let jitter = if factors.random <= 0.0 {
            0.0
        } else {
            rng.random_range(-factors.random..=factors.random)
        };
        self.mood = (self.patterns.mood_volatility.base_mood
            + time_factor * factors.time_of_day
            + recent_sentiment_impact * factors.recent_interactions
            + jitter)
            .clamp(0.0, 1.0);
    }

    fn is_obsession(&self, topic: &str) -> bool {
        self.patterns.same_user.obsession_override
            && self
                .patterns
                .same_user
                .obsession_topics
                .iter()
                .any(|t| t.eq_ignore_ascii_case(topic))
    }

    fn compute_score(&self, candidate: &Candidate, session: &SessionState) -> (f32, Option<&'static str>) {
        let obsession = self.is_obsession(&candidate.topic);

        if session.daily_user_interaction_count >= self.patterns.same_user.max_interactions_per_day
            && !obsession
        {
            return (0.05, Some("daily user cap"));
        }
        if session.user_in_cooldown && !obsession {
            return (0.10, Some("user cooldown"));
        }

        let mut score = self.probability_model.base_probability;
        score *= 0.5 + 0.5 * candidate.relevance_to_domain;
        if session.aggressive_mode {
            score += 0.30;
        }
        if obsession {
            score += 0.30;
        }
        score += match candidate.sentiment {
            Sentiment::Positive => 0.15,
            Sentiment::Negative => -0.20,
            Sentiment::Neutral => 0.0,
        };
        if candidate.relationship == RelationshipTier::Stranger {
            score -= 0.10;
        }
        if !obsession {
            score -= 0.10;
        }
        (score.clamp(0.0, 1.0), None)
    }

    /// Full decision procedure: regret check, hard gates, score
    /// construction, then a single Bernoulli gate for SKIP/INTERACT
    /// followed by three independent per-action draws.
    pub fn evaluate(&mut self, candidate: &Candidate, session: &SessionState, rng: &mut impl Rng) -> Decision {
        if session.post_comment_count > 0 && rng.random_bool(self.patterns.same_post.regret_probability as f64) {
            self.drift_mood_on_skip(rng);
            return Decision::Skip {
                reason: "over-committed".to_string(),
            };
        }

        let (score, gate_reason) = self.compute_score(candidate, session);

        let roll: f32 = rng.random_range(0.0..=1.0);
        if roll > score {
            let reason = gate_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| self.skip_reason(session));
            self.drift_mood_on_skip(rng);
            return Decision::Skip { reason };
        }

        let ratios = &self.probability_model.action_ratios;
        let like = rng.random_bool((score * ratios.like).clamp(0.0, 1.0) as f64);
        let repost = rng.random_bool((score * ratios.repost).clamp(0.0, 1.0) as f64);
        let comment = rng.random_bool((score * ratios.comment).clamp(0.0, 1.0) as f64);
        self.record_interaction(candidate.sentiment);
        Decision::Interact { like, repost, comment }
    }

    fn skip_reason(&self, session: &SessionState) -> String {
        if session.post_comment_count >= self.patterns.same_post.max_comments_per_post {
            "post-comment saturation".to_string()
        } else if self.mood < LOW_MOOD_THRESHOLD {
            "low mood".to_string()
        } else if session.daily_total_cap > 0 && session.daily_total_count >= session.daily_total_cap {
            "daily total cap".to_string()
        } else {
            "just passing".to_string()
        }
    }

    fn drift_mood_on_skip(&mut self, rng: &mut impl Rng) {
        let random_factor = self.patterns.mood_volatility.factors.random;
        if random_factor <= 0.0 {
            return;
        }
        let jitter = rng.random_range(-random_factor..=random_factor);
        self.mood = (self.mood + jitter).clamp(0.0, 1.0);
    }

    fn record_interaction(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => {
                self.mood = (self.mood + self.patterns.mood_volatility.positive_interaction_boost).min(1.0)
            }
            Sentiment::Negative => {
                self.mood = (self.mood - self.patterns.mood_volatility.negative_interaction_drop).max(0.0)
            }
            Sentiment::Neutral => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::persona::{ActionRatios, MoodFactors, MoodVolatility, SameUserPolicy};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn engine() -> BehaviorEngine {
        BehaviorEngine::new(
            InteractionPatterns::default(),
            ProbabilityModel {
                base_probability: 0.3,
                modifiers: Default::default(),
                action_ratios: ActionRatios::default(),
            },
        )
    }

    fn candidate() -> Candidate {
        Candidate {
            topic: "kimchi".into(),
            sentiment: Sentiment::Neutral,
            relevance_to_domain: 0.8,
            relationship: RelationshipTier::Familiar,
        }
    }

    #[test]
    fn daily_user_cap_forces_near_zero_score_and_skip() {
        let mut engine = engine();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let session = SessionState {
            daily_user_interaction_count: 3,
            ..Default::default()
        };
        let decision = engine.evaluate(&candidate(), &session, &mut rng);
        match decision {
            Decision::Skip { reason } => assert_eq!(reason, "daily user cap"),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn obsession_override_bypasses_daily_user_cap() {
        let mut patterns = InteractionPatterns::default();
        patterns.same_user = SameUserPolicy {
            max_interactions_per_day: 3,
            cooldown_minutes: 30,
            obsession_override: true,
            obsession_topics: vec!["kimchi".into()],
        };
        let mut engine = BehaviorEngine::new(
            patterns,
            ProbabilityModel {
                base_probability: 0.9,
                modifiers: Default::default(),
                action_ratios: ActionRatios::default(),
            },
        );
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let session = SessionState {
            daily_user_interaction_count: 5,
            ..Default::default()
        };
        let decision = engine.evaluate(&candidate(), &session, &mut rng);
        assert!(matches!(decision, Decision::Interact { .. }));
    }

    #[test]
    fn independent_action_draws_track_score_times_ratio() {
        let mut engine = BehaviorEngine::new(
            InteractionPatterns::default(),
            ProbabilityModel {
                base_probability: 1.0,
                modifiers: Default::default(),
                action_ratios: ActionRatios {
                    like: 1.0,
                    repost: 0.8,
                    comment: 0.6,
                },
            },
        );
        // relevance=1.0, relationship=Friend (no stranger penalty), obsession off (-0.10):
        // score = 1.0 * 1.0 - 0.10 = 0.90, well above any roll threshold we force below.
        let c = Candidate {
            topic: "kimchi".into(),
            sentiment: Sentiment::Neutral,
            relevance_to_domain: 1.0,
            relationship: RelationshipTier::Friend,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut likes = 0u32;
        let mut reposts = 0u32;
        let mut comments = 0u32;
        let trials = 2000u32;
        for _ in 0..trials {
            if let Decision::Interact { like, repost, comment } =
                engine.evaluate(&c, &SessionState::default(), &mut rng)
            {
                if like {
                    likes += 1;
                }
                if repost {
                    reposts += 1;
                }
                if comment {
                    comments += 1;
                }
            }
        }
        let like_rate = likes as f64 / trials as f64;
        let repost_rate = reposts as f64 / trials as f64;
        assert!(like_rate > 0.7, "like_rate={like_rate}");
        assert!(repost_rate > 0.5, "repost_rate={repost_rate}");
        assert!(comments <= trials);
    }

    #[test]
    fn mood_volatility_defaults_to_configured_base() {
        let mut cfg = InteractionPatterns::default();
        cfg.mood_volatility = MoodVolatility {
            base_mood: 0.4,
            factors: MoodFactors::default(),
            positive_interaction_boost: 0.05,
            negative_interaction_drop: 0.1,
        };
        let engine = BehaviorEngine::new(cfg, ProbabilityModel::default());
        assert!((engine.mood() - 0.4).abs() < f32::EPSILON);
    }
}
