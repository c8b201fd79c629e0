//! Creates, reinforces, and retrieves inspirations; decides "flash"
//! triggers from freshly observed content (§4.6).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use pf_core::{normalize_topic, Episode, Inspiration, Tier, Urgency};

use crate::store::MemoryStore;
use crate::tier::TierManager;
use crate::vector_index::{with_write_timeout, VectorIndex, VectorRecord, VectorSearchFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReinforcementEvent {
    SimilarContentSeen,
    SameTopicSearched,
    PostedAbout,
    Accessed,
}

impl ReinforcementEvent {
    fn deltas(self) -> (f32, u32) {
        match self {
            ReinforcementEvent::SimilarContentSeen => (0.10, 1),
            ReinforcementEvent::SameTopicSearched => (0.05, 1),
            ReinforcementEvent::PostedAbout => (0.30, 3),
            ReinforcementEvent::Accessed => (0.05, 0),
        }
    }
}

/// Result of feeding freshly observed content into the pool.
pub struct ContentSeenOutcome {
    pub reinforced: Vec<Inspiration>,
    /// Set when a high-impact observation reinforced an already-strong
    /// inspiration — the posting trigger engine's `flash_reinforced` input.
    pub flash_reinforced: Option<Inspiration>,
}

pub struct InspirationPool {
    store: Arc<MemoryStore>,
    vector_index: Arc<dyn VectorIndex>,
    tiers: TierManager,
}

impl InspirationPool {
    pub fn new(store: Arc<MemoryStore>, vector_index: Arc<dyn VectorIndex>) -> Self {
        Self {
            store,
            vector_index,
            tiers: TierManager::new(),
        }
    }

    /// Creates an inspiration from an episode, or reinforces an existing
    /// one sharing the same normalised topic.
    pub async fn create_from_episode(
        &self,
        episode: &Episode,
        my_angle: &str,
        urgency: Urgency,
    ) -> anyhow::Result<Inspiration> {
        let topic = normalize_topic(episode.topics.first().map(String::as_str).unwrap_or(""));
        if let Some(existing) = self.store.find_inspiration_by_topic(&topic)? {
            let (insp, _) = self.reinforce(&existing.id, ReinforcementEvent::Accessed).await?;
            return Ok(insp);
        }

        let mut insp = Inspiration::new(
            Some(episode.id.clone()),
            episode.content.clone(),
            topic,
            my_angle,
            urgency,
            episode.emotional_impact,
        );
        self.tiers.try_promote(&mut insp);
        self.store.insert_inspiration(&insp)?;
        self.sync_vector(&insp).await;
        Ok(insp)
    }

    /// Applies a reinforcement event, attempts promotion, and persists
    /// the result. Returns the updated inspiration and whether it was
    /// promoted this call.
    pub async fn reinforce(
        &self,
        inspiration_id: &str,
        event: ReinforcementEvent,
    ) -> anyhow::Result<(Inspiration, bool)> {
        let mut insp = self
            .store
            .get_inspiration(inspiration_id)?
            .ok_or_else(|| anyhow::anyhow!("inspiration {inspiration_id} not found"))?;

        let (strength_delta, reinforcement_delta) = event.deltas();
        insp.strength = (insp.strength + strength_delta).clamp(0.0, 1.0);
        insp.reinforcement_count += reinforcement_delta;
        insp.last_reinforced_at = Utc::now();
        insp.last_accessed_at = Utc::now();

        if event == ReinforcementEvent::PostedAbout {
            insp.used_count += 1;
            insp.last_used_at = Some(Utc::now());
            // "posted_about" upgrades to at least long_term regardless of
            // the ordinary promotion ladder.
            if insp.tier < Tier::LongTerm {
                insp.tier = Tier::LongTerm;
            }
        }

        let promoted = self.tiers.try_promote(&mut insp).is_some();
        self.store.update_inspiration(&insp)?;
        self.sync_vector(&insp).await;
        Ok((insp, promoted))
    }

    /// Vector-searches for inspirations similar to freshly seen content
    /// (distance <= 0.3), reinforces each, and flags a `flash_reinforced`
    /// trigger when the content is emotionally intense and a reinforced
    /// candidate is already strong.
    pub async fn on_content_seen(
        &self,
        content_embedding: &[f32],
        emotional_impact: f32,
    ) -> anyhow::Result<ContentSeenOutcome> {
        const DISTANCE_THRESHOLD: f32 = 0.3;
        let candidates = self
            .vector_index
            .search(content_embedding, 10, &VectorSearchFilter::default())
            .await?;

        let mut reinforced = Vec::new();
        let mut flash_reinforced = None;

        for candidate in candidates.into_iter().filter(|c| c.distance <= DISTANCE_THRESHOLD) {
            let (insp, _) = self
                .reinforce(&candidate.id, ReinforcementEvent::SimilarContentSeen)
                .await?;
            if emotional_impact >= 0.8 && insp.strength >= 0.5 && flash_reinforced.is_none() {
                flash_reinforced = Some(insp.clone());
            }
            reinforced.push(insp);
        }

        Ok(ContentSeenOutcome {
            reinforced,
            flash_reinforced,
        })
    }

    async fn sync_vector(&self, insp: &Inspiration) {
        let mut metadata = HashMap::new();
        metadata.insert("tier".to_string(), serde_json::json!(tier_label(insp.tier)));
        metadata.insert("strength".to_string(), serde_json::json!(insp.strength));
        metadata.insert("topic".to_string(), serde_json::json!(insp.topic));
        metadata.insert(
            "emotional_impact".to_string(),
            serde_json::json!(insp.emotional_impact),
        );
        metadata.insert(
            "reinforcement_count".to_string(),
            serde_json::json!(insp.reinforcement_count),
        );
        let record = VectorRecord {
            id: insp.id.clone(),
            document: insp.trigger_content.clone(),
            // Embeddings come from the caller-supplied provider (§6);
            // the pool itself only manages metadata bookkeeping here.
            embedding: Vec::new(),
            metadata,
        };
        with_write_timeout("inspiration_pool.sync_vector", self.vector_index.add(record)).await;
    }
}

fn tier_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Ephemeral => "ephemeral",
        Tier::ShortTerm => "short_term",
        Tier::LongTerm => "long_term",
        Tier::Core => "core",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_index::InMemoryVectorIndex;
    use pf_core::{EpisodeType, Sentiment};

    fn pool() -> InspirationPool {
        let store = Arc::new(MemoryStore::in_memory().unwrap());
        let index = Arc::new(InMemoryVectorIndex::new());
        InspirationPool::new(store, index)
    }

    #[tokio::test]
    async fn duplicate_topic_reinforces_instead_of_duplicating() {
        let pool = pool();
        let episode = Episode::new(
            EpisodeType::SawPost,
            "amazing kimchi",
            vec!["Kimchi".into()],
            Sentiment::Positive,
            0.6,
        );
        let first = pool
            .create_from_episode(&episode, "angle", Urgency::Brewing)
            .await
            .unwrap();
        let second = pool
            .create_from_episode(&episode, "angle", Urgency::Brewing)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.last_accessed_at >= first.last_accessed_at);
    }

    #[tokio::test]
    async fn posted_about_promotes_to_at_least_long_term() {
        let pool = pool();
        let episode = Episode::new(
            EpisodeType::SawPost,
            "fermentation update",
            vec!["ferment".into()],
            Sentiment::Neutral,
            0.4,
        );
        let insp = pool
            .create_from_episode(&episode, "angle", Urgency::Brewing)
            .await
            .unwrap();
        let (updated, _) = pool
            .reinforce(&insp.id, ReinforcementEvent::PostedAbout)
            .await
            .unwrap();
        assert!(updated.tier >= Tier::LongTerm);
        assert_eq!(updated.used_count, 1);
    }
}
