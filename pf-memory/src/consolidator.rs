//! Periodic sweep (§4.14): recomputes effective strength for every
//! inspiration, applies promotion/demotion, then enforces per-tier
//! capacity, syncing vector metadata in batch.

use std::collections::HashMap;
use std::sync::Arc;

use pf_core::Tier;
use tracing::info;

use crate::store::MemoryStore;
use crate::tier::{DemotionOutcome, TierManager};
use crate::vector_index::{with_write_timeout, VectorIndex};

pub struct Consolidator {
    store: Arc<MemoryStore>,
    vector_index: Arc<dyn VectorIndex>,
    tiers: TierManager,
}

#[derive(Debug, Default)]
pub struct ConsolidationReport {
    pub promoted: usize,
    pub demoted: usize,
    pub deleted: usize,
    pub capacity_trimmed: usize,
    pub core_memories_created: usize,
}

impl Consolidator {
    pub fn new(store: Arc<MemoryStore>, vector_index: Arc<dyn VectorIndex>) -> Self {
        Self {
            store,
            vector_index,
            tiers: TierManager::new(),
        }
    }

    pub async fn run(&self) -> anyhow::Result<ConsolidationReport> {
        let mut report = ConsolidationReport::default();
        let mut metadata_updates = Vec::new();

        for mut insp in self.store.all_inspirations()? {
            let current_strength = self.tiers.effective_strength(&insp);
            insp.strength = current_strength;

            if let Some(new_tier) = self.tiers.try_promote(&mut insp) {
                report.promoted += 1;
                if new_tier == Tier::Core {
                    let core = self.tiers.core_memory_from(&insp);
                    self.store.insert_core_memory(&core)?;
                    report.core_memories_created += 1;
                }
                self.store.update_inspiration(&insp)?;
            } else {
                match self.tiers.check_demotion(&mut insp, current_strength) {
                    DemotionOutcome::Keep => {
                        self.store.update_inspiration(&insp)?;
                    }
                    DemotionOutcome::Demoted => {
                        report.demoted += 1;
                        self.store.update_inspiration(&insp)?;
                    }
                    DemotionOutcome::Deleted => {
                        report.deleted += 1;
                        self.store.delete_inspiration(&insp.id)?;
                        continue;
                    }
                }
            }

            let mut meta = HashMap::new();
            meta.insert("tier".to_string(), serde_json::json!(tier_label(insp.tier)));
            meta.insert("strength".to_string(), serde_json::json!(insp.strength));
            metadata_updates.push((insp.id.clone(), meta));
        }

        report.capacity_trimmed = self.enforce_capacity()?;

        with_write_timeout(
            "consolidator.batch_update_metadata",
            self.vector_index.batch_update_metadata(metadata_updates),
        )
        .await;

        info!(
            promoted = report.promoted,
            demoted = report.demoted,
            deleted = report.deleted,
            capacity_trimmed = report.capacity_trimmed,
            core_memories_created = report.core_memories_created,
            "consolidation pass complete"
        );
        Ok(report)
    }

    /// Demotes or deletes the weakest members of each tier until every
    /// tier is at or under its configured maximum.
    fn enforce_capacity(&self) -> anyhow::Result<usize> {
        let mut trimmed = 0;
        for tier in Tier::ORDER {
            let population = self.store.inspirations_in_tier(tier)?; // ascending by strength
            let excess = self.tiers.excess_over_capacity(tier, &population);
            for insp in excess {
                let mut insp = insp.clone();
                let strength = insp.strength;
                match self.tiers.check_demotion(&mut insp, strength) {
                    DemotionOutcome::Deleted => {
                        self.store.delete_inspiration(&insp.id)?;
                    }
                    _ => {
                        // No room at this tier even after the normal
                        // demotion floor check: force one tier down so
                        // capacity is restored deterministically.
                        if let Some(prev) = tier.prev() {
                            insp.tier = prev;
                            self.store.update_inspiration(&insp)?;
                        } else {
                            self.store.delete_inspiration(&insp.id)?;
                        }
                    }
                }
                trimmed += 1;
            }
        }
        Ok(trimmed)
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
    use pf_core::{Inspiration, Urgency};

    #[tokio::test]
    async fn capacity_enforcement_trims_weakest_first() {
        let store = Arc::new(MemoryStore::in_memory().unwrap());
        for i in 0..105 {
            let mut insp = Inspiration::new(None, "t", format!("topic{i}"), "a", Urgency::Flash, 0.5);
            insp.tier = Tier::ShortTerm;
            insp.strength = 0.5 + (i as f32) * 0.001;
            store.insert_inspiration(&insp).unwrap();
        }
        let index = Arc::new(InMemoryVectorIndex::new());
        let consolidator = Consolidator::new(store.clone(), index);
        let report = consolidator.run().await.unwrap();
        assert!(report.capacity_trimmed >= 5);
        assert!(store.count_by_tier(Tier::ShortTerm).unwrap() <= 100);
    }

    #[tokio::test]
    async fn promotion_to_core_creates_exactly_one_core_memory() {
        let store = Arc::new(MemoryStore::in_memory().unwrap());
        let mut insp = Inspiration::new(None, "t", "kimchi", "a", Urgency::Flash, 0.9);
        insp.tier = Tier::LongTerm;
        insp.reinforcement_count = 10;
        insp.strength = 0.9;
        store.insert_inspiration(&insp).unwrap();

        let index = Arc::new(InMemoryVectorIndex::new());
        let consolidator = Consolidator::new(store.clone(), index);
        let report = consolidator.run().await.unwrap();
        assert_eq!(report.core_memories_created, 1);
        assert_eq!(store.list_core_memories().unwrap().len(), 1);
    }
}
