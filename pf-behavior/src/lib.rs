//! Behavior engine, interaction intelligence, topic selection, pattern
//! tracking, and the follow engine: the decision layer that turns a
//! perceived candidate into like/repost/reply/follow actions.

pub mod behavior_engine;
pub mod follow_engine;
pub mod interaction;
pub mod pattern_tracker;
pub mod topic_selector;

pub use behavior_engine::{BehaviorEngine, Candidate, Decision, SessionState};
pub use follow_engine::{FollowCandidateProfile, FollowEngine, FollowOutcome};
pub use interaction::{select_response_type, Complexity, Perception, ResponseType};
pub use pattern_tracker::{
    ContextualPattern, FillerPattern, FrequentPattern, PatternRegistry, PatternTracker,
    SignaturePattern, Violation,
};
pub use topic_selector::{SourceCandidates, TopicQuery, TopicSelector, TopicWeights};
