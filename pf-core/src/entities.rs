//! Persisted entity records (see the data model: episodes, inspirations,
//! core memories, relationships, conversations, posting history, pattern
//! usage, and cached knowledge).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Discrete longevity class of an inspiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Ephemeral,
    ShortTerm,
    LongTerm,
    Core,
}

impl Tier {
    pub const ORDER: [Tier; 4] = [Tier::Ephemeral, Tier::ShortTerm, Tier::LongTerm, Tier::Core];

    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|t| *t == self).unwrap()
    }

    pub fn next(self) -> Option<Tier> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    pub fn prev(self) -> Option<Tier> {
        self.index().checked_sub(1).map(|i| Self::ORDER[i])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeType {
    SawPost,
    Replied,
    Liked,
    Posted,
    Searched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// An observation of something that happened. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub episode_type: EpisodeType,
    pub source_id: Option<String>,
    pub source_user: Option<String>,
    pub content: String,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub emotional_impact: f32,
}

impl Episode {
    pub fn new(
        episode_type: EpisodeType,
        content: impl Into<String>,
        topics: Vec<String>,
        sentiment: Sentiment,
        emotional_impact: f32,
    ) -> Self {
        Self {
            id: new_id(),
            timestamp: Utc::now(),
            episode_type,
            source_id: None,
            source_user: None,
            content: content.into(),
            topics,
            sentiment,
            emotional_impact: emotional_impact.clamp(0.0, 1.0),
        }
    }
}

/// Urgency with which an inspiration was first distilled from an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Flash,
    Brewing,
}

/// A candidate idea distilled from one or more episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspiration {
    pub id: String,
    pub origin_episode_id: Option<String>,
    pub trigger_content: String,
    /// Normalised topic key (lowercase, whitespace-stripped; "general" if empty).
    pub topic: String,
    pub my_angle: String,
    pub potential_post: Option<String>,
    pub tier: Tier,
    pub strength: f32,
    pub emotional_impact: f32,
    pub reinforcement_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_reinforced_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub used_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Inspiration {
    pub fn new(
        origin_episode_id: Option<String>,
        trigger_content: impl Into<String>,
        topic: impl Into<String>,
        my_angle: impl Into<String>,
        urgency: Urgency,
        emotional_impact: f32,
    ) -> Self {
        let now = Utc::now();
        let (strength, tier) = match urgency {
            Urgency::Flash => (0.8, Tier::ShortTerm),
            Urgency::Brewing => (0.5, Tier::Ephemeral),
        };
        Self {
            id: new_id(),
            origin_episode_id,
            trigger_content: trigger_content.into(),
            topic: normalize_topic(&topic.into()),
            my_angle: my_angle.into(),
            potential_post: None,
            tier,
            strength,
            emotional_impact: emotional_impact.clamp(0.0, 1.0),
            reinforcement_count: 0,
            created_at: now,
            last_reinforced_at: now,
            last_accessed_at: now,
            used_count: 0,
            last_used_at: None,
        }
    }
}

/// Lowercase, whitespace-stripped topic key; empty input maps to "general".
pub fn normalize_topic(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.is_empty() {
        "general".to_string()
    } else {
        trimmed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreMemoryType {
    Obsession,
    Opinion,
    Theme,
    Trait,
}

/// A crystallised, non-decaying fact about the persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreMemory {
    pub id: String,
    pub core_type: CoreMemoryType,
    pub content: String,
    pub formed_from_inspiration_id: String,
    pub total_reinforcements: u32,
    pub persona_impact: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipTier {
    Stranger,
    Acquaintance,
    Familiar,
    Friend,
}

/// Identity of a counterparty plus running interaction statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonMemory {
    pub id: String,
    pub platform_user_id: String,
    pub screen_name: String,
    pub first_met_at: DateTime<Utc>,
    pub tier: RelationshipTier,
    pub affinity: f32,
    pub my_reply_count: u32,
    pub my_like_count: u32,
    pub their_reply_count: u32,
    pub their_like_count: u32,
    pub sentiment_history: Vec<Sentiment>,
    pub common_topics: Vec<String>,
    pub who_is_this: Option<String>,
    pub last_interaction_at: DateTime<Utc>,
    pub ongoing_conversation_count: u32,
}

impl PersonMemory {
    pub fn new(platform_user_id: impl Into<String>, screen_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            platform_user_id: platform_user_id.into(),
            screen_name: screen_name.into(),
            first_met_at: now,
            tier: RelationshipTier::Stranger,
            affinity: 0.0,
            my_reply_count: 0,
            my_like_count: 0,
            their_reply_count: 0,
            their_like_count: 0,
            sentiment_history: Vec::new(),
            common_topics: Vec::new(),
            who_is_this: None,
            last_interaction_at: now,
            ongoing_conversation_count: 0,
        }
    }

    /// Fixed-step affinity bump clamped to [0, 1], plus the tier upgrade
    /// rule: stranger -> acquaintance on first interaction, acquaintance
    /// -> familiar once three conversations have gone to `ongoing`.
    pub fn record_positive_interaction(&mut self) {
        self.affinity = (self.affinity + 0.05).min(1.0);
        self.last_interaction_at = Utc::now();
        if self.tier == RelationshipTier::Stranger {
            self.tier = RelationshipTier::Acquaintance;
        } else if self.tier == RelationshipTier::Acquaintance && self.ongoing_conversation_count >= 3
        {
            self.tier = RelationshipTier::Familiar;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Ongoing,
    Concluded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub person_id: String,
    pub platform: String,
    pub post_id: String,
    pub conversation_type: String,
    pub topic: Option<String>,
    pub summary: Option<String>,
    pub turn_count: u32,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn new(
        person_id: impl Into<String>,
        platform: impl Into<String>,
        post_id: impl Into<String>,
        conversation_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            person_id: person_id.into(),
            platform: platform.into(),
            post_id: post_id.into(),
            conversation_type: conversation_type.into(),
            topic: None,
            summary: None,
            turn_count: 0,
            state: ConversationState::Ongoing,
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn record_turn(&mut self) {
        self.turn_count += 1;
        self.last_updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Flash,
    FlashReinforced,
    Ready,
    MoodBurst,
    RandomRecall,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingHistoryEntry {
    pub id: String,
    pub origin_inspiration_id: Option<String>,
    pub content: String,
    pub trigger_type: TriggerType,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Signature,
    Frequent,
    Filler,
    Contextual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternUsage {
    pub pattern_type: PatternType,
    pub pattern_literal: String,
    pub post_id: String,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub keyword: String,
    pub summary: String,
    pub my_angle: String,
    pub relevance: f32,
    pub source_platform: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_normalization_lowercases_and_trims() {
        assert_eq!(normalize_topic("  Braised Kimchi  "), "braised kimchi");
        assert_eq!(normalize_topic(""), "general");
        assert_eq!(normalize_topic("   "), "general");
    }

    #[test]
    fn inspiration_initial_state_by_urgency() {
        let flash = Inspiration::new(None, "trig", "Kimchi", "angle", Urgency::Flash, 0.9);
        assert_eq!(flash.tier, Tier::ShortTerm);
        assert!((flash.strength - 0.8).abs() < f32::EPSILON);

        let brewing = Inspiration::new(None, "trig", "Kimchi", "angle", Urgency::Brewing, 0.4);
        assert_eq!(brewing.tier, Tier::Ephemeral);
        assert!((brewing.strength - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn tier_ordering_moves_one_step_at_a_time() {
        assert_eq!(Tier::Ephemeral.next(), Some(Tier::ShortTerm));
        assert_eq!(Tier::Core.next(), None);
        assert_eq!(Tier::Core.prev(), Some(Tier::LongTerm));
        assert_eq!(Tier::Ephemeral.prev(), None);
    }

    #[test]
    fn relationship_tier_upgrades_monotonically() {
        let mut p = PersonMemory::new("u1", "alice");
        assert_eq!(p.tier, RelationshipTier::Stranger);
        p.record_positive_interaction();
        assert_eq!(p.tier, RelationshipTier::Acquaintance);
        p.ongoing_conversation_count = 3;
        p.record_positive_interaction();
        assert_eq!(p.tier, RelationshipTier::Familiar);
    }
}
