//! FeedJourney (§4.13): a hybrid, rule-based classifier over a fetched
//! batch of posts, no LLM involved in the classification step itself.

use pf_core::persona::Identity;
use pf_core::{AgentError, EpisodeType, RelationshipTier};
use pf_llm::{Post, SocialPlatformAdapter};
use pf_memory::MemoryStore;
use rand::Rng;

use crate::scenario::{run_scenario, ScenarioDeps, ScenarioResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedCategory {
    Familiar,
    Interesting,
    Other,
}

fn classify(store: &MemoryStore, identity: &Identity, post: &Post) -> (FeedCategory, f32) {
    if let Ok(person) = store.get_or_create_person(&post.author_id, &post.author_screen_name) {
        if matches!(person.tier, RelationshipTier::Familiar | RelationshipTier::Friend) {
            return (FeedCategory::Familiar, person.affinity);
        }
    }
    let lowered = post.text.to_lowercase();
    let interesting = identity
        .core_keywords
        .iter()
        .any(|kw| !kw.is_empty() && lowered.contains(&kw.to_lowercase()));
    if interesting {
        (FeedCategory::Interesting, (post.like_count + 2 * post.repost_count) as f32)
    } else {
        (FeedCategory::Other, 0.0)
    }
}

/// Chooses one post out of `posts` per the §4.13 selection priority and
/// dispatches it to a scenario. Returns `None` if nothing was selected
/// (empty feed, or the 10% `other` draw missed with no familiar/interesting
/// candidate available).
pub struct FeedJourney<'a> {
    pub deps: &'a ScenarioDeps<'a>,
    pub persona_context: &'a str,
}

impl<'a> FeedJourney<'a> {
    pub async fn run(
        &self,
        posts: &[Post],
        identity: &Identity,
        rng: &mut impl Rng,
    ) -> Option<Result<ScenarioResult, AgentError>> {
        let chosen = select_post(self.deps.store, identity, posts, rng)?;
        let recent_replies: Vec<String> = match self.deps.store.recent_episodes(Some(EpisodeType::Replied), 5) {
            Ok(episodes) => episodes.into_iter().map(|e| e.content).collect(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch recent replies for novelty check");
                Vec::new()
            }
        };
        Some(run_scenario(self.deps, chosen, "feed", self.persona_context, &recent_replies, rng).await)
    }
}

fn select_post<'p>(
    store: &MemoryStore,
    identity: &Identity,
    posts: &'p [Post],
    rng: &mut impl Rng,
) -> Option<&'p Post> {
    if posts.is_empty() {
        return None;
    }
    let mut best_familiar: Option<(&Post, f32)> = None;
    let mut best_interesting: Option<(&Post, f32)> = None;
    let mut others: Vec<&Post> = Vec::new();

    for post in posts {
        match classify(store, identity, post) {
            (FeedCategory::Familiar, score) => {
                if best_familiar.map(|(_, s)| score > s).unwrap_or(true) {
                    best_familiar = Some((post, score));
                }
            }
            (FeedCategory::Interesting, score) => {
                if best_interesting.map(|(_, s)| score > s).unwrap_or(true) {
                    best_interesting = Some((post, score));
                }
            }
            (FeedCategory::Other, _) => others.push(post),
        }
    }

    if let Some((post, _)) = best_familiar {
        return Some(post);
    }
    if let Some((post, _)) = best_interesting {
        return Some(post);
    }
    if !others.is_empty() && rng.random_bool(0.10) {
        let idx = rng.random_range(0..others.len());
        return Some(others[idx]);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn post(id: &str, author: &str, text: &str, likes: u64, reposts: u64) -> Post {
        Post {
            id: id.to_string(),
            author_id: author.to_string(),
            author_screen_name: author.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
            like_count: likes,
            repost_count: reposts,
            is_reply: false,
            reply_to_id: None,
        }
    }

    #[test]
    fn prefers_familiar_over_interesting() {
        let store = MemoryStore::in_memory().unwrap();
        let mut familiar = store.get_or_create_person("fam1", "fam1").unwrap();
        familiar.tier = RelationshipTier::Familiar;
        familiar.affinity = 0.8;
        store.update_person(&familiar).unwrap();

        let identity = Identity {
            core_keywords: vec!["kimchi".to_string()],
            ..Default::default()
        };
        let posts = vec![post("p1", "stranger", "kimchi is life", 100, 50), post("p2", "fam1", "hello there", 0, 0)];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let chosen = select_post(&store, &identity, &posts, &mut rng).unwrap();
        assert_eq!(chosen.id, "p2");
    }

    #[test]
    fn falls_back_to_interesting_when_no_familiar() {
        let store = MemoryStore::in_memory().unwrap();
        let identity = Identity {
            core_keywords: vec!["kimchi".to_string()],
            ..Default::default()
        };
        let posts = vec![post("p1", "stranger", "nothing relevant", 0, 0), post("p2", "stranger2", "kimchi is great", 5, 1)];
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let chosen = select_post(&store, &identity, &posts, &mut rng).unwrap();
        assert_eq!(chosen.id, "p2");
    }

    #[test]
    fn returns_none_for_empty_feed() {
        let store = MemoryStore::in_memory().unwrap();
        let identity = Identity::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(select_post(&store, &identity, &[], &mut rng).is_none());
    }
}
