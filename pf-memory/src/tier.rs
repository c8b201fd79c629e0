//! Tier lifecycle: decay, promotion/demotion, and capacity enforcement
//! (§4.5).

use chrono::Utc;
use pf_core::{new_id, CoreMemory, CoreMemoryType, Inspiration, Tier};

#[derive(Debug, Clone, Copy)]
pub struct TierConfig {
    pub decay_rate_per_day: f32,
    pub promotion_strength: Option<f32>,
    pub promotion_reinforcements: Option<u32>,
    pub demotion_floor: f32,
    pub max_count: Option<usize>,
}

fn config_for(tier: Tier) -> TierConfig {
    match tier {
        Tier::Ephemeral => TierConfig {
            decay_rate_per_day: 0.70,
            promotion_strength: Some(0.3),
            promotion_reinforcements: None,
            demotion_floor: 0.05,
            max_count: None,
        },
        Tier::ShortTerm => TierConfig {
            decay_rate_per_day: 0.90,
            promotion_strength: None,
            promotion_reinforcements: Some(3),
            demotion_floor: 0.10,
            max_count: Some(100),
        },
        Tier::LongTerm => TierConfig {
            decay_rate_per_day: 0.98,
            promotion_strength: None,
            promotion_reinforcements: Some(10),
            demotion_floor: 0.20,
            max_count: Some(50),
        },
        Tier::Core => TierConfig {
            decay_rate_per_day: 1.00,
            promotion_strength: None,
            promotion_reinforcements: None,
            demotion_floor: 0.0,
            max_count: Some(20),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemotionOutcome {
    Keep,
    Demoted,
    Deleted,
}

pub struct TierManager;

impl Default for TierManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TierManager {
    pub fn new() -> Self {
        Self
    }

    pub fn config_for(&self, tier: Tier) -> TierConfig {
        config_for(tier)
    }

    /// Effective strength at "now" per the §4.5 decay formula: higher
    /// emotional impact and more reinforcements both slow decay.
    pub fn effective_strength(&self, insp: &Inspiration) -> f32 {
        let cfg = config_for(insp.tier);
        let now = Utc::now();
        let hours_since = (now - insp.last_reinforced_at).num_seconds() as f32 / 3600.0;
        let days = (hours_since / 24.0).max(0.0);

        let base = cfg.decay_rate_per_day.powf(days);
        let emotional_factor = 1.0 - (insp.emotional_impact * 0.3);
        let reinforce_factor = 1.0 / (1.0 + insp.reinforcement_count as f32 * 0.1);
        let exponent = emotional_factor * reinforce_factor;
        let decayed = base.powf(exponent);
        (insp.strength * decayed).clamp(0.0, 1.0)
    }

    /// Attempts promotion to the next tier. Returns the new tier if it
    /// fired; mutates `insp.tier` in place.
    pub fn try_promote(&self, insp: &mut Inspiration) -> Option<Tier> {
        let cfg = config_for(insp.tier);
        let next = insp.tier.next()?;

        let strength_ok = cfg
            .promotion_strength
            .is_some_and(|t| insp.strength >= t);
        let reinforcement_ok = cfg
            .promotion_reinforcements
            .is_some_and(|t| insp.reinforcement_count >= t);

        if strength_ok || reinforcement_ok {
            insp.tier = next;
            Some(next)
        } else {
            None
        }
    }

    /// Checks demotion/deletion against a supplied current strength
    /// (normally the output of [`effective_strength`]).
    pub fn check_demotion(&self, insp: &mut Inspiration, current_strength: f32) -> DemotionOutcome {
        let cfg = config_for(insp.tier);
        if current_strength >= cfg.demotion_floor || insp.tier == Tier::Core {
            return DemotionOutcome::Keep;
        }
        match insp.tier.prev() {
            None => DemotionOutcome::Deleted,
            Some(prev) => {
                insp.tier = prev;
                DemotionOutcome::Demoted
            }
        }
    }

    /// Builds a [`CoreMemory`] from an inspiration that has just been
    /// promoted to `core`. Type classification per §4.5:
    /// reinforcement_count >= 15 -> obsession; used_count >= 3 -> theme;
    /// an opinion marker in `my_angle` -> opinion; else theme.
    pub fn core_memory_from(&self, insp: &Inspiration) -> CoreMemory {
        let core_type = self.classify_core_type(insp);
        let persona_impact = match core_type {
            CoreMemoryType::Obsession => {
                format!("brings up '{}' often and visibly cares about it", insp.topic)
            }
            CoreMemoryType::Opinion => format!("holds a firm opinion about '{}'", insp.topic),
            CoreMemoryType::Theme => {
                format!("the theme of '{}' recurs across posts and replies", insp.topic)
            }
            CoreMemoryType::Trait => format!("'{}' has stuck as a lasting trait", insp.topic),
        };
        CoreMemory {
            id: new_id(),
            core_type,
            content: if insp.my_angle.is_empty() {
                insp.topic.clone()
            } else {
                insp.my_angle.clone()
            },
            formed_from_inspiration_id: insp.id.clone(),
            total_reinforcements: insp.reinforcement_count,
            persona_impact,
            created_at: Utc::now(),
        }
    }

    fn classify_core_type(&self, insp: &Inspiration) -> CoreMemoryType {
        const OPINION_MARKERS: [&str; 6] =
            ["i think", "i believe", "honestly", "imo", "unpopular opinion", "disagree"];
        if insp.reinforcement_count >= 15 {
            CoreMemoryType::Obsession
        } else if insp.used_count >= 3 {
            CoreMemoryType::Theme
        } else if OPINION_MARKERS
            .iter()
            .any(|m| insp.my_angle.to_lowercase().contains(m))
        {
            CoreMemoryType::Opinion
        } else {
            CoreMemoryType::Theme
        }
    }

    /// Returns ids that must be demoted/deleted to bring `population`
    /// (already sorted ascending by strength) back under the tier's cap.
    pub fn excess_over_capacity<'a>(
        &self,
        tier: Tier,
        population_ascending_strength: &'a [Inspiration],
    ) -> &'a [Inspiration] {
        let cfg = config_for(tier);
        match cfg.max_count {
            Some(max) if population_ascending_strength.len() > max => {
                &population_ascending_strength[..population_ascending_strength.len() - max]
            }
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pf_core::Urgency;

    #[test]
    fn effective_strength_decreases_with_time() {
        let mgr = TierManager::new();
        let mut insp = Inspiration::new(None, "t", "kimchi", "a", Urgency::Flash, 0.5);
        let s_now = mgr.effective_strength(&insp);
        insp.last_reinforced_at = Utc::now() - Duration::hours(48);
        let s_later = mgr.effective_strength(&insp);
        assert!(s_later < s_now);
    }

    #[test]
    fn effective_strength_increases_with_emotional_impact_and_reinforcement() {
        let mgr = TierManager::new();
        let mut low = Inspiration::new(None, "t", "kimchi", "a", Urgency::Flash, 0.1);
        low.last_reinforced_at = Utc::now() - Duration::hours(24);
        let mut high = low.clone();
        high.emotional_impact = 0.9;
        high.reinforcement_count = 10;
        assert!(mgr.effective_strength(&high) > mgr.effective_strength(&low));
    }

    #[test]
    fn promotion_chain_ephemeral_to_core() {
        let mgr = TierManager::new();
        let mut insp = Inspiration::new(None, "t", "kimchi", "a", Urgency::Brewing, 0.5);
        insp.strength = 0.35;
        assert_eq!(mgr.try_promote(&mut insp), Some(Tier::ShortTerm));

        insp.reinforcement_count = 3;
        assert_eq!(mgr.try_promote(&mut insp), Some(Tier::LongTerm));

        insp.reinforcement_count = 10;
        assert_eq!(mgr.try_promote(&mut insp), Some(Tier::Core));

        // already at the top
        assert_eq!(mgr.try_promote(&mut insp), None);
    }

    #[test]
    fn demotion_deletes_from_ephemeral_only() {
        let mgr = TierManager::new();
        let mut eph = Inspiration::new(None, "t", "x", "a", Urgency::Brewing, 0.1);
        eph.tier = Tier::Ephemeral;
        assert_eq!(mgr.check_demotion(&mut eph, 0.01), DemotionOutcome::Deleted);

        let mut long = Inspiration::new(None, "t", "x", "a", Urgency::Flash, 0.1);
        long.tier = Tier::LongTerm;
        assert_eq!(mgr.check_demotion(&mut long, 0.05), DemotionOutcome::Demoted);
        assert_eq!(long.tier, Tier::ShortTerm);
    }

    #[test]
    fn core_never_demotes() {
        let mgr = TierManager::new();
        let mut core = Inspiration::new(None, "t", "x", "a", Urgency::Flash, 0.1);
        core.tier = Tier::Core;
        assert_eq!(mgr.check_demotion(&mut core, 0.0), DemotionOutcome::Keep);
    }

    #[test]
    fn classification_rules_in_priority_order() {
        let mgr = TierManager::new();
        let mut obsession = Inspiration::new(None, "t", "x", "i think this rocks", Urgency::Flash, 0.9);
        obsession.reinforcement_count = 20;
        obsession.used_count = 5;
        assert_eq!(mgr.classify_core_type(&obsession), CoreMemoryType::Obsession);

        let mut theme = Inspiration::new(None, "t", "x", "neutral angle", Urgency::Flash, 0.5);
        theme.used_count = 4;
        assert_eq!(mgr.classify_core_type(&theme), CoreMemoryType::Theme);

        let mut opinion = Inspiration::new(None, "t", "x", "i think this is overrated", Urgency::Flash, 0.5);
        opinion.used_count = 0;
        assert_eq!(mgr.classify_core_type(&opinion), CoreMemoryType::Opinion);
    }
}
