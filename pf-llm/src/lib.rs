//! External interfaces (§6): the LLM provider traits and the social
//! platform adapter trait, each wrapped with a per-call timeout so the
//! orchestrator's cooperative event loop is never blocked indefinitely.

pub mod adapter;
pub mod provider;

pub use adapter::{Notification, NotificationType, Post, SocialPlatformAdapter, User};
pub use provider::{EmbeddingProvider, LlmProvider, MockEmbeddingProvider, MockLlmProvider};
