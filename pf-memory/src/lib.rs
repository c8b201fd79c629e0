//! Structured memory store, vector index, tier lifecycle, inspiration
//! pool, posting trigger engine, and periodic consolidation.

pub mod consolidator;
pub mod inspiration_pool;
pub mod store;
pub mod tier;
pub mod trigger;
pub mod vector_index;

pub use consolidator::Consolidator;
pub use inspiration_pool::{InspirationPool, ReinforcementEvent};
pub use store::{MemoryStore, ReadyInspirationFilter};
pub use tier::TierManager;
pub use trigger::{PostingDecision, PostingTriggerEngine};
pub use vector_index::{VectorIndex, VectorRecord, VectorSearchFilter};
