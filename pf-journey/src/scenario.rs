//! Scenario contract (§4.13): the bounded perceive-judge-act-update
//! handler shared by both journeys.

use pf_behavior::Perception;
use pf_core::persona::ResponseStrategy;
use pf_core::{AgentError, ConversationRecord, Episode, EpisodeType, Inspiration, Sentiment, Urgency};
use pf_llm::{EmbeddingProvider, Post, SocialPlatformAdapter};
use pf_memory::{InspirationPool, MemoryStore};
use rand::Rng;

use crate::engagement_judge::EngagementJudge;
use crate::perception::InteractionIntelligence;
use crate::reply_generator::ReplyGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioAction {
    Skip,
    Like,
    Repost,
    Reply,
    Follow,
    FollowQueued,
    Acknowledged,
}

#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub success: bool,
    pub action: ScenarioAction,
    pub content: Option<String>,
    pub details: Option<String>,
    /// The episode recorded from perceiving this post, if one was
    /// processed. Feeds the posting trigger engine's "latest episode".
    pub episode: Option<Episode>,
    /// Set when `on_content_seen` judged this post similar enough to an
    /// already-strong inspiration and emotionally intense enough to
    /// count as a flash-reinforcement candidate.
    pub flash_reinforced: Option<Inspiration>,
}

impl ScenarioResult {
    pub fn skip(details: impl Into<String>) -> Self {
        Self {
            success: true,
            action: ScenarioAction::Skip,
            content: None,
            details: Some(details.into()),
            episode: None,
            flash_reinforced: None,
        }
    }

    pub fn acted(action: ScenarioAction, content: Option<String>) -> Self {
        Self {
            success: true,
            action,
            content,
            details: None,
            episode: None,
            flash_reinforced: None,
        }
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            success: false,
            action: ScenarioAction::Skip,
            content: None,
            details: Some(details.into()),
            episode: None,
            flash_reinforced: None,
        }
    }
}

/// The collaborators a scenario needs but does not own, bundled so
/// `run_scenario`'s signature does not grow with every new dependency.
pub struct ScenarioDeps<'a> {
    pub store: &'a MemoryStore,
    pub adapter: &'a dyn SocialPlatformAdapter,
    pub judge: &'a EngagementJudge,
    pub reply_gen: &'a ReplyGenerator,
    pub intel: &'a InteractionIntelligence,
    pub pool: &'a InspirationPool,
    pub embedder: &'a dyn EmbeddingProvider,
    pub response_strategy: &'a ResponseStrategy,
    pub core_keywords: &'a [String],
    pub platform: &'a str,
}

/// Runs the common scenario shape (§4.13 steps 1-5) for one post: resolve
/// counterparty and conversation, perceive the post, ask the
/// EngagementJudge, act on each true boolean, then update memory.
/// Account-throttle errors propagate; everything else degrades to a soft
/// failure for that one action.
pub async fn run_scenario(
    deps: &ScenarioDeps<'_>,
    post: &Post,
    conversation_type: &str,
    persona_context: &str,
    recent_replies: &[String],
    rng: &mut impl Rng,
) -> Result<ScenarioResult, AgentError> {
    let mut person = deps
        .store
        .get_or_create_person(&post.author_id, &post.author_screen_name)
        .map_err(AgentError::Storage)?;

    let existing = deps
        .store
        .ongoing_conversation_for(&person.id, &post.id)
        .map_err(AgentError::Storage)?;
    let mut conversation = match existing {
        Some(conv) => conv,
        None => {
            let conv = ConversationRecord::new(&person.id, deps.platform, &post.id, conversation_type);
            deps.store.insert_conversation(&conv).map_err(AgentError::Storage)?;
            conv
        }
    };

    let perception = deps
        .intel
        .perceive(&post.text, &post.author_screen_name, deps.response_strategy, rng)
        .await;
    let (episode, flash_reinforced) = record_perception(deps, post, &perception).await;

    let enriched_context = format!(
        "{persona_context}\n\nPerceived: topics={:?}, sentiment={:?}, intent={}, relevance={:.2}, angle={}",
        perception.topics, perception.sentiment, perception.intent, perception.relevance_to_domain, perception.my_angle
    );
    let decision = deps.judge.judge(&post.text, &enriched_context).await;

    let mut acted = false;
    let mut content: Option<String> = None;
    let mut primary_action = ScenarioAction::Acknowledged;
    let mut any_call_failed = false;

    if decision.like {
        match deps.adapter.like(&post.id).await {
            Ok(_) => {
                acted = true;
                primary_action = ScenarioAction::Like;
                record_action_episode(deps, EpisodeType::Liked, &post.text, &perception, episode.emotional_impact);
            }
            Err(err) => classify_or_log(&err)?,
        }
    }
    if decision.repost {
        match deps.adapter.repost(&post.id).await {
            Ok(_) => {
                acted = true;
                primary_action = ScenarioAction::Repost;
            }
            Err(err) => classify_or_log(&err)?,
        }
    }
    if decision.reply {
        let prompt = format!("Reply to: {}\nReason to engage: {}", post.text, decision.reason);
        match deps.reply_gen.generate(&prompt, recent_replies).await {
            Ok(reply_text) => match deps.adapter.post(&reply_text, None, Some(&post.id)).await {
                Ok(_) => {
                    acted = true;
                    primary_action = ScenarioAction::Reply;
                    record_action_episode(deps, EpisodeType::Replied, &reply_text, &perception, episode.emotional_impact);
                    content = Some(reply_text);
                }
                Err(err) => {
                    classify_or_log(&err)?;
                    any_call_failed = true;
                }
            },
            Err(err) => {
                classify_or_log(&err)?;
                any_call_failed = true;
            }
        }
    }

    if acted {
        person.record_positive_interaction();
        deps.store.update_person(&person).map_err(AgentError::Storage)?;
    }
    conversation.record_turn();
    deps.store.update_conversation(&conversation).map_err(AgentError::Storage)?;

    Ok(ScenarioResult {
        success: !any_call_failed,
        action: if acted { primary_action } else { ScenarioAction::Acknowledged },
        content,
        details: if any_call_failed { Some("one or more actions failed".to_string()) } else { None },
        episode: Some(episode),
        flash_reinforced,
    })
}

/// Step 2 of the scenario contract plus its memory side effects: persists
/// an episode from the perceived post, feeds it to the inspiration pool's
/// `on_content_seen`, and — when impact is high and a distinct angle was
/// perceived — distills a new "brewing" inspiration from it.
async fn record_perception(
    deps: &ScenarioDeps<'_>,
    post: &Post,
    perception: &Perception,
) -> (Episode, Option<Inspiration>) {
    let emotional_impact = emotional_impact_from_perception(perception, deps.core_keywords);
    let mut episode = Episode::new(
        EpisodeType::SawPost,
        post.text.clone(),
        perception.topics.clone(),
        perception.sentiment,
        emotional_impact,
    );
    episode.source_id = Some(post.id.clone());
    episode.source_user = Some(post.author_screen_name.clone());
    if let Err(err) = deps.store.insert_episode(&episode) {
        tracing::warn!(error = %err, "failed to persist episode");
    }

    if emotional_impact >= 0.6 && !perception.my_angle.is_empty() {
        if let Err(err) = deps
            .pool
            .create_from_episode(&episode, &perception.my_angle, Urgency::Brewing)
            .await
        {
            tracing::warn!(error = %err, "failed to distill inspiration from episode");
        }
    }

    let flash_reinforced = match deps.embedder.embed(&post.text).await {
        Ok(embedding) => match deps.pool.on_content_seen(&embedding, emotional_impact).await {
            Ok(outcome) => outcome.flash_reinforced,
            Err(err) => {
                tracing::warn!(error = %err, "content-seen reinforcement failed");
                None
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "embedding generation failed, skipping reinforcement");
            None
        }
    };

    (episode, flash_reinforced)
}

/// Persists an episode for the agent's own action (a reply or a like) so
/// later scenarios can look back at what it has already said or done —
/// in particular `recent_episodes(Some(EpisodeType::Replied), ..)`, which
/// feeds the reply generator's novelty check.
fn record_action_episode(deps: &ScenarioDeps<'_>, episode_type: EpisodeType, content: &str, perception: &Perception, emotional_impact: f32) {
    let episode = Episode::new(episode_type, content, perception.topics.clone(), perception.sentiment, emotional_impact);
    if let Err(err) = deps.store.insert_episode(&episode) {
        tracing::warn!(error = %err, "failed to persist action episode");
    }
}

/// Mirrors the original's emotional-impact heuristic: a neutral base,
/// boosted by sentiment polarity, a topic match against the persona's
/// core keywords, and a question-like intent.
fn emotional_impact_from_perception(perception: &Perception, core_keywords: &[String]) -> f32 {
    let mut impact: f32 = 0.5;
    impact += match perception.sentiment {
        Sentiment::Positive => 0.2,
        Sentiment::Negative => 0.1,
        Sentiment::Neutral => 0.0,
    };
    let topic_matches_core = perception.topics.iter().any(|topic| {
        core_keywords
            .iter()
            .any(|kw| !kw.is_empty() && topic.to_lowercase().contains(&kw.to_lowercase()))
    });
    if topic_matches_core {
        impact += 0.3;
    }
    if perception.intent.to_lowercase().contains("question") {
        impact += 0.1;
    }
    impact.clamp(0.0, 1.0)
}

/// Re-raises account-level throttle errors per §7; everything else is
/// logged and treated as a soft per-action failure.
fn classify_or_log(err: &anyhow::Error) -> Result<(), AgentError> {
    let classified = AgentError::from_platform_signal(&err.to_string());
    if classified.is_account_throttle() {
        return Err(classified);
    }
    tracing::warn!(error = %err, "scenario action failed, continuing");
    Ok(())
}
