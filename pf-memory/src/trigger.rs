//! Posting trigger engine (§4.7): aggregates episode impact,
//! reinforcement events, matured inspirations, mood, and randomness
//! into a posting decision, gated by rate caps.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pf_core::{Episode, Inspiration, Tier, TriggerType};
use rand::Rng;

use crate::inspiration_pool::InspirationPool;
use crate::store::{MemoryStore, ReadyInspirationFilter};

#[derive(Debug, Clone, Copy)]
pub enum Urgency {
    Immediate,
    Soon,
    Whenever,
}

#[derive(Debug, Clone)]
pub struct PostingDecision {
    pub trigger_type: TriggerType,
    pub urgency: Urgency,
    pub source_inspiration_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub max_posts_per_day: u32,
    pub min_interval_minutes: i64,
    pub p_flash: f32,
    pub p_flash_reinforced: f32,
    pub p_mood_burst: f32,
    pub p_random_recall: f32,
    pub maturation_hours: i64,
    pub ready_cooldown_days: i64,
    pub ready_min_strength: f32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            max_posts_per_day: 5,
            min_interval_minutes: 60,
            p_flash: 0.70,
            p_flash_reinforced: 0.80,
            p_mood_burst: 0.30,
            p_random_recall: 0.05,
            maturation_hours: 24,
            ready_cooldown_days: 7,
            ready_min_strength: 0.4,
        }
    }
}

pub struct PostingTriggerEngine {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) pool: Arc<InspirationPool>,
    config: TriggerConfig,
}

impl PostingTriggerEngine {
    pub fn new(store: Arc<MemoryStore>, pool: Arc<InspirationPool>, config: TriggerConfig) -> Self {
        Self { store, pool, config }
    }

    fn rate_limits_ok(&self) -> anyhow::Result<bool> {
        let since_midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let posts_today = self.store.posts_since(since_midnight)?;
        if posts_today >= self.config.max_posts_per_day as usize {
            return Ok(false);
        }
        if let Some(last) = self.store.last_post_time()? {
            if Utc::now() - last < Duration::minutes(self.config.min_interval_minutes) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn ready_inspiration_matching(&self, topics: &[String]) -> anyhow::Result<Option<Inspiration>> {
        let filter = ReadyInspirationFilter {
            min_strength: self.config.ready_min_strength,
            tiers: vec![Tier::LongTerm, Tier::Core],
            matured_since: Some(Utc::now() - Duration::hours(self.config.maturation_hours)),
            cooldown_days: self.config.ready_cooldown_days,
            limit: 20,
        };
        let candidates = self.store.ready_inspirations(&filter)?;
        if topics.is_empty() {
            return Ok(candidates.into_iter().next());
        }
        Ok(candidates
            .into_iter()
            .find(|i| topics.iter().any(|t| t.eq_ignore_ascii_case(&i.topic))))
    }

    fn any_ready_inspiration(&self) -> anyhow::Result<Option<Inspiration>> {
        let filter = ReadyInspirationFilter {
            min_strength: self.config.ready_min_strength,
            tiers: vec![Tier::LongTerm, Tier::Core],
            matured_since: Some(Utc::now() - Duration::hours(self.config.maturation_hours)),
            cooldown_days: self.config.ready_cooldown_days,
            limit: 1,
        };
        Ok(self.store.ready_inspirations(&filter)?.into_iter().next())
    }

    /// Evaluates the five triggers in fixed order, first match wins
    /// (§4.7; trigger-ordering fairness is an open question — see
    /// DESIGN.md for the chosen resolution).
    pub fn evaluate(
        &self,
        latest_episode: &Episode,
        flash_reinforced_candidate: Option<&Inspiration>,
        current_mood: f32,
        rng: &mut impl Rng,
    ) -> anyhow::Result<Option<PostingDecision>> {
        if !self.rate_limits_ok()? {
            return Ok(None);
        }

        if latest_episode.emotional_impact >= 0.9 && rng.random_bool(self.config.p_flash as f64) {
            return Ok(Some(PostingDecision {
                trigger_type: TriggerType::Flash,
                urgency: Urgency::Immediate,
                source_inspiration_id: None,
            }));
        }

        if let Some(candidate) = flash_reinforced_candidate {
            if rng.random_bool(self.config.p_flash_reinforced as f64) {
                return Ok(Some(PostingDecision {
                    trigger_type: TriggerType::FlashReinforced,
                    urgency: Urgency::Immediate,
                    source_inspiration_id: Some(candidate.id.clone()),
                }));
            }
        }

        if let Some(ready) = self.ready_inspiration_matching(&latest_episode.topics)? {
            return Ok(Some(PostingDecision {
                trigger_type: TriggerType::Ready,
                urgency: Urgency::Soon,
                source_inspiration_id: Some(ready.id),
            }));
        }

        if current_mood >= 0.8 {
            if let Some(ready) = self.any_ready_inspiration()? {
                if rng.random_bool(self.config.p_mood_burst as f64) {
                    return Ok(Some(PostingDecision {
                        trigger_type: TriggerType::MoodBurst,
                        urgency: Urgency::Soon,
                        source_inspiration_id: Some(ready.id),
                    }));
                }
            }
        }

        if let Some(ready) = self.any_ready_inspiration()? {
            if rng.random_bool(self.config.p_random_recall as f64) {
                return Ok(Some(PostingDecision {
                    trigger_type: TriggerType::RandomRecall,
                    urgency: Urgency::Whenever,
                    source_inspiration_id: Some(ready.id),
                }));
            }
        }

        Ok(None)
    }

    /// Advances daily/last-post counters and, if the post was sourced
    /// from an inspiration, reinforces it with `posted_about`.
    pub async fn record_post(
        &self,
        decision: &PostingDecision,
        content: &str,
    ) -> anyhow::Result<pf_core::PostingHistoryEntry> {
        let entry = pf_core::PostingHistoryEntry {
            id: pf_core::new_id(),
            origin_inspiration_id: decision.source_inspiration_id.clone(),
            content: content.to_string(),
            trigger_type: decision.trigger_type,
            posted_at: Utc::now(),
        };
        self.store.insert_posting_history(&entry)?;

        if let Some(id) = &decision.source_inspiration_id {
            self.pool
                .reinforce(id, crate::inspiration_pool::ReinforcementEvent::PostedAbout)
                .await?;
        }

        Ok(entry)
    }

    pub fn posts_remaining_today(&self) -> anyhow::Result<u32> {
        let since_midnight: DateTime<Utc> = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let posted = self.store.posts_since(since_midnight)? as u32;
        Ok(self.config.max_posts_per_day.saturating_sub(posted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::{EpisodeType, Sentiment};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn engine() -> PostingTriggerEngine {
        let store = Arc::new(MemoryStore::in_memory().unwrap());
        let index = Arc::new(crate::vector_index::InMemoryVectorIndex::new());
        let pool = Arc::new(InspirationPool::new(store.clone(), index));
        PostingTriggerEngine::new(store, pool, TriggerConfig::default())
    }

    #[test]
    fn flash_trigger_fires_on_high_impact_episode() {
        let engine = engine();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let episode = Episode::new(
            EpisodeType::SawPost,
            "braised kimchi perfection",
            vec!["braised".into()],
            Sentiment::Positive,
            0.95,
        );
        let mut config = TriggerConfig::default();
        config.p_flash = 1.0;
        let engine = PostingTriggerEngine::new(engine.store.clone(), engine.pool.clone(), config);
        let decision = engine
            .evaluate(&episode, None, 0.5, &mut rng)
            .unwrap()
            .expect("flash should fire");
        assert_eq!(decision.trigger_type, TriggerType::Flash);
    }

    #[test]
    fn rate_cap_blocks_further_triggers() {
        let store = Arc::new(MemoryStore::in_memory().unwrap());
        let index = Arc::new(crate::vector_index::InMemoryVectorIndex::new());
        let pool = Arc::new(InspirationPool::new(store.clone(), index));
        let mut config = TriggerConfig::default();
        config.max_posts_per_day = 1;
        let engine = PostingTriggerEngine::new(store.clone(), pool, config);

        store
            .insert_posting_history(&pf_core::PostingHistoryEntry {
                id: pf_core::new_id(),
                origin_inspiration_id: None,
                content: "already posted".into(),
                trigger_type: TriggerType::Manual,
                posted_at: Utc::now(),
            })
            .unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let episode = Episode::new(
            EpisodeType::SawPost,
            "x",
            vec![],
            Sentiment::Positive,
            0.99,
        );
        assert!(engine.evaluate(&episode, None, 0.9, &mut rng).unwrap().is_none());
    }
}
