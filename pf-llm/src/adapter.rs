//! Social platform adapter (§6): the caller-supplied surface the
//! orchestrator drives. Every call is wrapped in a per-call timeout
//! (≤15s per §5); a timeout is treated as a failed call with no memory
//! mutation, never re-raised unless it carries an account-level signal.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_core::AgentError;
use serde::{Deserialize, Serialize};

/// Per-call timeout budget for adapter operations, per §5.
pub const ADAPTER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub author_screen_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    pub repost_count: u64,
    pub is_reply: bool,
    pub reply_to_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Reply,
    Mention,
    Quote,
    Follow,
    Repost,
    Like,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub notification_type: NotificationType,
    pub actor_user_id: String,
    pub actor_screen_name: String,
    pub post_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub screen_name: String,
    pub bio: String,
    pub has_profile_image: bool,
    pub follower_count: u64,
    pub following_count: u64,
    pub account_age_days: u32,
}

/// Caller-supplied platform integration. Implementations talk to a real
/// API; this crate only defines the contract and the timeout/error
/// plumbing every caller needs.
#[async_trait]
pub trait SocialPlatformAdapter: Send + Sync {
    async fn search(&self, query: &str, n: usize) -> Result<Vec<Post>>;
    async fn get_mentions(&self, n: usize) -> Result<Vec<Notification>>;
    async fn get_all_notifications(&self, n: usize) -> Result<Vec<Notification>>;
    async fn get_following_list(&self, screen_name: &str, n: usize) -> Result<Vec<User>>;
    async fn get_user_tweets(&self, user_id: &str, n: usize) -> Result<Vec<Post>>;
    async fn get_post(&self, id: &str) -> Result<Option<Post>>;
    async fn get_user(&self, id_or_screen_name: &str) -> Result<Option<User>>;
    async fn post(&self, content: &str, media: Option<&[u8]>, reply_to: Option<&str>) -> Result<String>;
    async fn like(&self, id: &str) -> Result<bool>;
    async fn repost(&self, id: &str) -> Result<bool>;
    async fn follow(&self, user_id: &str) -> Result<bool>;
    async fn get_trends(&self, locale: &str) -> Result<Vec<String>>;
}

/// Wraps an adapter call in the §5 timeout and classifies the error
/// signal on failure so the caller can route it to Mode Manager / the
/// Human-like Controller without re-parsing strings itself.
pub async fn call_with_timeout<T, F>(operation: &str, fut: F) -> Result<T, AgentError>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(ADAPTER_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(AgentError::from_platform_signal(&err.to_string())),
        Err(_) => {
            tracing::warn!(operation, "adapter call timed out");
            Err(AgentError::Transient(format!("{operation} timed out")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowAdapter;

    #[async_trait]
    impl SocialPlatformAdapter for SlowAdapter {
        async fn search(&self, _query: &str, _n: usize) -> Result<Vec<Post>> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(vec![])
        }
        async fn get_mentions(&self, _n: usize) -> Result<Vec<Notification>> {
            Ok(vec![])
        }
        async fn get_all_notifications(&self, _n: usize) -> Result<Vec<Notification>> {
            Ok(vec![])
        }
        async fn get_following_list(&self, _screen_name: &str, _n: usize) -> Result<Vec<User>> {
            Ok(vec![])
        }
        async fn get_user_tweets(&self, _user_id: &str, _n: usize) -> Result<Vec<Post>> {
            Ok(vec![])
        }
        async fn get_post(&self, _id: &str) -> Result<Option<Post>> {
            Ok(None)
        }
        async fn get_user(&self, _id_or_screen_name: &str) -> Result<Option<User>> {
            Ok(None)
        }
        async fn post(&self, _content: &str, _media: Option<&[u8]>, _reply_to: Option<&str>) -> Result<String> {
            Err(anyhow::anyhow!("403 forbidden, automated behaviour detected"))
        }
        async fn like(&self, _id: &str) -> Result<bool> {
            Ok(true)
        }
        async fn repost(&self, _id: &str) -> Result<bool> {
            Ok(true)
        }
        async fn follow(&self, _user_id: &str) -> Result<bool> {
            Ok(true)
        }
        async fn get_trends(&self, _locale: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn successful_call_passes_through() {
        let adapter = SlowAdapter;
        let result = call_with_timeout("search", adapter.search("kimchi", 5)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn error_signal_is_classified_as_account_throttle() {
        let adapter = SlowAdapter;
        let err = call_with_timeout("post", adapter.post("hi", None, None)).await.unwrap_err();
        assert!(err.is_account_throttle());
    }
}
