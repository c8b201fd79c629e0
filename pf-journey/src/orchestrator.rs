//! Session orchestrator (§4.14): the outer loop that consults the
//! activity scheduler, picks a task by sampling persona mode weights,
//! executes it, and drains periodic housekeeping (consolidation, the
//! follow queue) between sessions.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Timelike, Utc};
use pf_behavior::{BehaviorEngine, FollowEngine, PatternTracker, SourceCandidates, TopicSelector};
use pf_core::{AgentError, Episode, Inspiration, Persona, PostingHistoryEntry, Sentiment, TriggerType};
use pf_llm::{EmbeddingProvider, LlmProvider, Post, SocialPlatformAdapter};
use pf_memory::{Consolidator, InspirationPool, MemoryStore, PostingTriggerEngine, ReadyInspirationFilter, VectorIndex};
use pf_scheduler::mode::ErrorOutcome;
use pf_scheduler::{ActivityScheduler, ActivityState, ModeManager};
use rand::Rng;

use crate::engagement_judge::EngagementJudge;
use crate::feed_journey::FeedJourney;
use crate::notification_journey::NotificationJourney;
use crate::perception::InteractionIntelligence;
use crate::reply_generator::ReplyGenerator;
use crate::scenario::{ScenarioDeps, ScenarioResult};

/// Probability of trying NotificationJourney before FeedJourney in a
/// `social` session. Not part of the persona schema; the persona's own
/// step probabilities govern whether each *step inside* a journey fires.
const P_NOTIFICATIONS: f64 = 0.60;

/// How many sessions elapse between consolidation sweeps.
const CONSOLIDATION_INTERVAL: u64 = 20;

/// Bucketed time-of-day mood factor, mirroring the original's
/// morning/lunch/afternoon/dinner/late-night schedule.
fn time_mood_factor(now: DateTime<Utc>) -> f32 {
    match now.hour() {
        6..=10 => 0.4,
        11..=13 => 0.3,
        14..=16 => 0.6,
        17..=20 => 0.5,
        _ => 0.7,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTask {
    Social,
    Casual,
    Series,
}

#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Idle { state: ActivityState },
    Executed { task: SessionTask, summary: String },
    Paused { until: DateTime<Utc> },
}

pub struct SessionOrchestrator {
    persona: Persona,
    store: Arc<MemoryStore>,
    adapter: Arc<dyn SocialPlatformAdapter>,
    judge: EngagementJudge,
    reply_gen: ReplyGenerator,
    intel: InteractionIntelligence,
    inspiration_pool: Arc<InspirationPool>,
    trigger_engine: PostingTriggerEngine,
    embedder: Arc<dyn EmbeddingProvider>,
    behavior_engine: BehaviorEngine,
    llm: Arc<dyn LlmProvider>,
    mode_manager: ModeManager,
    activity_scheduler: ActivityScheduler,
    follow_engine: FollowEngine,
    topic_selector: TopicSelector,
    pattern_tracker: PatternTracker,
    consolidator: Consolidator,
    platform: String,
    session_count: u64,
}

impl SessionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        persona: Persona,
        store: Arc<MemoryStore>,
        adapter: Arc<dyn SocialPlatformAdapter>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_index: Arc<dyn VectorIndex>,
        mode_manager: ModeManager,
        topic_selector: TopicSelector,
        pattern_tracker: PatternTracker,
        consolidator: Consolidator,
        platform: impl Into<String>,
    ) -> Self {
        let activity_scheduler = ActivityScheduler::new(persona.behavior.activity_schedule.clone());
        let follow_engine = FollowEngine::new(persona.behavior.follow_behavior.clone());
        let inspiration_pool = Arc::new(InspirationPool::new(store.clone(), vector_index));
        let trigger_engine = PostingTriggerEngine::new(store.clone(), inspiration_pool.clone(), Default::default());
        let behavior_engine = BehaviorEngine::new(
            persona.behavior.interaction_patterns.clone(),
            persona.behavior.probability_model.clone(),
        );
        Self {
            judge: EngagementJudge::new(llm.clone()),
            reply_gen: ReplyGenerator::new(llm.clone()),
            intel: InteractionIntelligence::new(llm.clone()),
            inspiration_pool,
            trigger_engine,
            embedder,
            behavior_engine,
            persona,
            store,
            adapter,
            llm,
            mode_manager,
            activity_scheduler,
            follow_engine,
            topic_selector,
            pattern_tracker,
            consolidator,
            platform: platform.into(),
            session_count: 0,
        }
    }

    fn persona_context(&self) -> String {
        format!(
            "{} ({}): {}",
            self.persona.identity.name, self.persona.identity.occupation, self.persona.identity.identity
        )
    }

    /// Weighted-samples a task name out of `persona.mode_weights`;
    /// defaults to `social` when the table is empty or all-zero.
    fn pick_task(&self, rng: &mut impl Rng) -> SessionTask {
        let weights = &self.persona.mode_weights;
        let total: f32 = weights.values().sum();
        if weights.is_empty() || total <= 0.0 {
            return SessionTask::Social;
        }
        let mut roll = rng.random_range(0.0..total);
        for (name, weight) in weights {
            if roll < *weight {
                return match name.as_str() {
                    "casual" => SessionTask::Casual,
                    "series" => SessionTask::Series,
                    _ => SessionTask::Social,
                };
            }
            roll -= weight;
        }
        SessionTask::Social
    }

    /// Runs one session: a scheduler check, a task pick, the task itself,
    /// then periodic housekeeping. Account-throttle errors surfaced by a
    /// journey are routed into the Mode Manager rather than propagated.
    pub async fn run_session(&mut self, now: DateTime<Utc>, rng: &mut impl Rng) -> SessionOutcome {
        let tick = self.activity_scheduler.tick(now, rng);
        if !tick.is_active {
            let mode_cfg = self.mode_manager.config();
            let honored = match tick.state {
                ActivityState::Asleep => mode_cfg.honor_sleep,
                ActivityState::OnBreak => mode_cfg.honor_breaks,
                _ => true,
            };
            if honored {
                return SessionOutcome::Idle { state: tick.state };
            }
        }
        if let Some(until) = self.mode_manager.forced_pause_until() {
            if now < until {
                return SessionOutcome::Paused { until };
            }
        }

        self.refresh_mood(now, rng);
        let task = self.pick_task(rng);
        let outcome = match task {
            SessionTask::Social => self.run_social(now, rng).await,
            SessionTask::Casual => self.run_casual(now, rng).await,
            SessionTask::Series => Ok("series tasks are out of scope".to_string()),
        };

        self.session_count += 1;
        if self.session_count % CONSOLIDATION_INTERVAL == 0 {
            if let Err(err) = self.consolidator.run().await {
                tracing::warn!(error = %err, "periodic consolidation failed");
            }
        }
        self.drain_follow_queue(now).await;

        match outcome {
            Ok(summary) => {
                self.mode_manager.on_success(now);
                SessionOutcome::Executed { task, summary }
            }
            Err(err) => match self.mode_manager.on_error(&err, now) {
                ErrorOutcome::Continue => SessionOutcome::Executed {
                    task,
                    summary: format!("soft failure: {err}"),
                },
                ErrorOutcome::Pause { until } => SessionOutcome::Paused { until },
            },
        }
    }

    async fn run_social(&mut self, now: DateTime<Utc>, rng: &mut impl Rng) -> Result<String, AgentError> {
        let persona_context = self.persona_context();
        let try_notifications_first = rng.random_bool(P_NOTIFICATIONS);

        let ran_notifications = if try_notifications_first {
            self.run_notifications(&persona_context, now, rng).await?
        } else {
            None
        };

        if let Some(count) = ran_notifications {
            return Ok(format!("notifications: {count} processed"));
        }

        let ran_feed = self.run_feed(&persona_context, now, rng).await?;
        if let Some(result) = ran_feed {
            return Ok(format!("feed: {:?}", result.action));
        }

        // Neither ran: retry whichever wasn't attempted first.
        if try_notifications_first {
            match self.run_feed(&persona_context, now, rng).await? {
                Some(result) => Ok(format!("feed (retry): {:?}", result.action)),
                None => Ok("nothing to do this session".to_string()),
            }
        } else {
            match self.run_notifications(&persona_context, now, rng).await? {
                Some(count) => Ok(format!("notifications (retry): {count} processed")),
                None => Ok("nothing to do this session".to_string()),
            }
        }
    }

    fn scenario_deps<'a>(&'a self, core_keywords: &'a [String]) -> ScenarioDeps<'a> {
        ScenarioDeps {
            store: self.store.as_ref(),
            adapter: self.adapter.as_ref(),
            judge: &self.judge,
            reply_gen: &self.reply_gen,
            intel: &self.intel,
            pool: self.inspiration_pool.as_ref(),
            embedder: self.embedder.as_ref(),
            response_strategy: &self.persona.behavior.response_strategy,
            core_keywords,
            platform: &self.platform,
        }
    }

    async fn run_notifications(
        &mut self,
        persona_context: &str,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Result<Option<usize>, AgentError> {
        let core_keywords = self.persona.identity.core_keywords.clone();
        let deps = self.scenario_deps(&core_keywords);
        let journey = NotificationJourney { deps: &deps, persona_context };
        let results = journey.run(50, 1, rng).await?;
        let count = results.len();
        for result in &results {
            if let Some(episode) = &result.episode {
                self.maybe_trigger_post(episode, result.flash_reinforced.as_ref(), now, rng).await;
            }
        }
        Ok(if count == 0 { None } else { Some(count) })
    }

    async fn run_feed(
        &mut self,
        persona_context: &str,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Result<Option<ScenarioResult>, AgentError> {
        let query = format!("{} -filter:links", self.persona.identity.core_keywords.first().cloned().unwrap_or_default());
        let posts: Vec<Post> = self
            .adapter
            .search(&query, 20)
            .await
            .map_err(|e| AgentError::from_platform_signal(&e.to_string()))?;
        if posts.is_empty() {
            return Ok(None);
        }
        let core_keywords = self.persona.identity.core_keywords.clone();
        let deps = self.scenario_deps(&core_keywords);
        let journey = FeedJourney { deps: &deps, persona_context };
        let outcome = match journey.run(&posts, &self.persona.identity, rng).await {
            Some(Ok(result)) => result,
            Some(Err(err)) => return Err(err),
            None => return Ok(None),
        };
        if let Some(episode) = &outcome.episode {
            self.maybe_trigger_post(episode, outcome.flash_reinforced.as_ref(), now, rng).await;
        }
        Ok(Some(outcome))
    }

    /// Recomputes the behavior engine's mood from the time of day and the
    /// most recently observed episode's sentiment, per §4.8.
    fn refresh_mood(&mut self, now: DateTime<Utc>, rng: &mut impl Rng) {
        let time_factor = time_mood_factor(now);
        let recent_sentiment_impact = self
            .store
            .recent_episodes(None, 1)
            .ok()
            .and_then(|eps| eps.into_iter().next())
            .map(|ep| match ep.sentiment {
                Sentiment::Positive => 1.0,
                Sentiment::Negative => -1.0,
                Sentiment::Neutral => 0.0,
            })
            .unwrap_or(0.0);
        self.behavior_engine.refresh_mood(time_factor, recent_sentiment_impact, rng);
    }

    /// §4.7: feeds the latest perceived episode to the Posting Trigger
    /// Engine and, if a trigger fires, generates and publishes the post.
    async fn maybe_trigger_post(
        &mut self,
        episode: &Episode,
        flash_reinforced: Option<&Inspiration>,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) {
        let mood = self.behavior_engine.mood();
        let decision = match self.trigger_engine.evaluate(episode, flash_reinforced, mood, rng) {
            Ok(Some(decision)) => decision,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(error = %err, "posting trigger evaluation failed");
                return;
            }
        };
        if let Err(err) = self.publish_triggered_post(&decision, episode, now).await {
            tracing::warn!(error = %err, "posting trigger fired but publish failed");
        }
    }

    async fn publish_triggered_post(
        &mut self,
        decision: &pf_memory::PostingDecision,
        episode: &Episode,
        now: DateTime<Utc>,
    ) -> Result<(), AgentError> {
        let topic_hint = match &decision.source_inspiration_id {
            Some(id) => self
                .store
                .get_inspiration(id)
                .map_err(AgentError::Storage)?
                .map(|i| format!("Topic: {} (angle: {})", i.topic, i.my_angle))
                .unwrap_or_default(),
            None => episode.topics.first().cloned().unwrap_or_default(),
        };

        let prompt = format!(
            "You are {}. {:?} prompted you to post (urgency {:?}). {}\nWrite one short social post.",
            self.persona.identity.name, decision.trigger_type, decision.urgency, topic_hint
        );
        let mut content = self
            .llm
            .generate(&prompt, Some("Write in character, one short post, no hashtag spam."), None)
            .await
            .map_err(|e| AgentError::LlmFormat(e.to_string()))?;

        let store = &self.store;
        let violations = self.pattern_tracker.check_violations(&content, Some("triggered"), |literal| {
            store.posts_since_pattern_used(literal).unwrap_or(u32::MAX as usize) as u32
        });
        if !violations.is_empty() {
            let feedback = PatternTracker::format_violations_for_llm(&violations);
            let retry_prompt = format!("{prompt}\n\n{feedback}");
            if let Ok(retry) = self.llm.generate(&retry_prompt, None, None).await {
                content = retry;
            }
        }
        if pf_core::text::contains_forbidden_characters(&content) {
            return Err(AgentError::LlmFormat("generated content contains forbidden characters".to_string()));
        }

        let post_id = self
            .adapter
            .post(&content, None, None)
            .await
            .map_err(|e| AgentError::from_platform_signal(&e.to_string()))?;

        self.pattern_tracker.record_usage(&content, &post_id, now);
        self.trigger_engine.record_post(decision, &content).await.map_err(AgentError::Storage)?;
        Ok(())
    }

    async fn run_casual(&mut self, now: DateTime<Utc>, rng: &mut impl Rng) -> Result<String, AgentError> {
        let sources = SourceCandidates {
            core: self.persona.identity.core_keywords.clone(),
            time: self.persona.identity.time_keywords.clone(),
            curiosity: Vec::new(),
            inspiration: self
                .store
                .ready_inspirations(&ReadyInspirationFilter::default())
                .map_err(AgentError::Storage)?
                .into_iter()
                .map(|i| i.topic)
                .collect(),
            trends: self.adapter.get_trends("en").await.unwrap_or_default(),
        };
        let topic = match self.topic_selector.select(&sources, rng) {
            Some(q) => q,
            None => return Ok("no topic available for casual post".to_string()),
        };

        let knowledge = self.store.get_knowledge(&topic.keyword).map_err(AgentError::Storage)?;
        let knowledge_context = knowledge
            .map(|k| format!("Known context: {} (angle: {})", k.summary, k.my_angle))
            .unwrap_or_default();

        let prompt = format!(
            "You are {}. Write one social post about \"{}\". {}",
            self.persona.identity.name, topic.keyword, knowledge_context
        );

        let mut content = self
            .llm
            .generate(&prompt, Some("Write in character, one short post, no hashtag spam."), None)
            .await
            .map_err(|e| AgentError::LlmFormat(e.to_string()))?;

        let store = &self.store;
        let violations = self.pattern_tracker.check_violations(&content, Some("casual"), |literal| {
            store.posts_since_pattern_used(literal).unwrap_or(u32::MAX as usize) as u32
        });
        if !violations.is_empty() {
            let feedback = PatternTracker::format_violations_for_llm(&violations);
            let retry_prompt = format!("{prompt}\n\n{feedback}");
            if let Ok(retry) = self.llm.generate(&retry_prompt, None, None).await {
                content = retry;
            }
        }
        if pf_core::text::contains_forbidden_characters(&content) {
            return Err(AgentError::LlmFormat("generated content contains forbidden characters".to_string()));
        }

        let post_id = self
            .adapter
            .post(&content, None, None)
            .await
            .map_err(|e| AgentError::from_platform_signal(&e.to_string()))?;

        self.pattern_tracker.record_usage(&content, &post_id, now);
        let entry = PostingHistoryEntry {
            id: pf_core::new_id(),
            origin_inspiration_id: None,
            content: content.clone(),
            trigger_type: TriggerType::Manual,
            posted_at: now,
        };
        self.store.insert_posting_history(&entry).map_err(AgentError::Storage)?;

        Ok(format!("casual post published: {post_id}"))
    }

    async fn drain_follow_queue(&mut self, now: DateTime<Utc>) {
        let ready = self.follow_engine.drain_ready(now, 3);
        for (user_id, _screen_name) in ready {
            let outcome = self.adapter.follow(&user_id).await;
            self.follow_engine.record_follow_attempt(now, outcome.is_ok());
        }
    }

    /// Inter-session sleep duration: `Uniform(min, max) / max(activity_level, 0.1)`.
    pub fn next_sleep_duration(&mut self, now: DateTime<Utc>, rng: &mut impl Rng) -> StdDuration {
        let cfg = self.mode_manager.config();
        let base =
            rng.random_range(cfg.session_interval_min_secs..=cfg.session_interval_max_secs.max(cfg.session_interval_min_secs));
        let activity_level = self.activity_scheduler.activity_level(now).max(0.1);
        StdDuration::from_secs_f64((base / activity_level as f64).max(1.0))
    }
}
