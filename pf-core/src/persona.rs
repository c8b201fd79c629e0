//! Persona configuration schema (§6). A persona package is a directory
//! named `<persona_id>` containing a handful of YAML files; this module
//! defines the closed schema those files deserialize into and the
//! loader that assembles them. Unrecognised keys are tolerated and kept
//! in a free-form side-channel for logging, never consulted for
//! behaviour (see §9 "dynamic keys and loose dicts").

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub perspective: String,
    #[serde(default)]
    pub relevance_desc: String,
    #[serde(default)]
    pub fallback_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub core_keywords: Vec<String>,
    #[serde(default)]
    pub time_keywords: Vec<String>,
    #[serde(default)]
    pub domain: DomainConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LengthRange {
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechBlock {
    #[serde(default)]
    pub length: LengthRange,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub starters: Vec<String>,
    #[serde(default)]
    pub endings: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuipPool {
    #[serde(default)]
    pub agreement: Vec<String>,
    #[serde(default)]
    pub impressed: Vec<String>,
    #[serde(default)]
    pub casual: Vec<String>,
    #[serde(default)]
    pub food_related: Vec<String>,
    #[serde(default)]
    pub skeptical: Vec<String>,
    #[serde(default)]
    pub simple_answer: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechStyle {
    #[serde(default)]
    pub chat: SpeechBlock,
    #[serde(default)]
    pub post: SpeechBlock,
    #[serde(default)]
    pub energy_levels: Vec<String>,
    #[serde(default)]
    pub opener_pool: Vec<String>,
    #[serde(default)]
    pub closer_pool: Vec<String>,
    #[serde(default)]
    pub signature_phrases: Vec<String>,
    #[serde(default)]
    pub quip_pool: QuipPool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SameUserPolicy {
    #[serde(default = "default_max_interactions")]
    pub max_interactions_per_day: u32,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    #[serde(default)]
    pub obsession_override: bool,
    #[serde(default)]
    pub obsession_topics: Vec<String>,
}

fn default_max_interactions() -> u32 {
    3
}
fn default_cooldown_minutes() -> i64 {
    30
}

impl Default for SameUserPolicy {
    fn default() -> Self {
        Self {
            max_interactions_per_day: default_max_interactions(),
            cooldown_minutes: default_cooldown_minutes(),
            obsession_override: false,
            obsession_topics: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamePostPolicy {
    #[serde(default = "default_max_comments")]
    pub max_comments_per_post: u32,
    #[serde(default = "default_regret_probability")]
    pub regret_probability: f32,
}

fn default_max_comments() -> u32 {
    1
}
fn default_regret_probability() -> f32 {
    0.1
}

impl Default for SamePostPolicy {
    fn default() -> Self {
        Self {
            max_comments_per_post: default_max_comments(),
            regret_probability: default_regret_probability(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoodFactors {
    #[serde(default)]
    pub time_of_day: f32,
    #[serde(default)]
    pub recent_interactions: f32,
    #[serde(default)]
    pub random: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodVolatility {
    #[serde(default = "default_base_mood")]
    pub base_mood: f32,
    #[serde(default)]
    pub factors: MoodFactors,
    #[serde(default = "default_positive_boost")]
    pub positive_interaction_boost: f32,
    #[serde(default = "default_negative_drop")]
    pub negative_interaction_drop: f32,
}

fn default_base_mood() -> f32 {
    0.5
}
fn default_positive_boost() -> f32 {
    0.05
}
fn default_negative_drop() -> f32 {
    0.1
}

impl Default for MoodVolatility {
    fn default() -> Self {
        Self {
            base_mood: default_base_mood(),
            factors: MoodFactors::default(),
            positive_interaction_boost: default_positive_boost(),
            negative_interaction_drop: default_negative_drop(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionPatterns {
    #[serde(default)]
    pub same_user: SameUserPolicy,
    #[serde(default)]
    pub same_post: SamePostPolicy,
    #[serde(default)]
    pub mood_volatility: MoodVolatility,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionRatios {
    #[serde(default = "one")]
    pub like: f32,
    #[serde(default = "point_eight")]
    pub repost: f32,
    #[serde(default = "point_six")]
    pub comment: f32,
}
fn one() -> f32 {
    1.0
}
fn point_eight() -> f32 {
    0.8
}
fn point_six() -> f32 {
    0.6
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilityModel {
    #[serde(default = "default_base_probability")]
    pub base_probability: f32,
    #[serde(default)]
    pub modifiers: HashMap<String, f32>,
    #[serde(default)]
    pub action_ratios: ActionRatios,
}
fn default_base_probability() -> f32 {
    0.3
}
impl Default for ProbabilityModel {
    fn default() -> Self {
        Self {
            base_probability: default_base_probability(),
            modifiers: HashMap::new(),
            action_ratios: ActionRatios::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepProbabilities {
    #[serde(default)]
    pub scout: f32,
    #[serde(default)]
    pub mentions: f32,
    #[serde(default)]
    pub reply_check: f32,
    #[serde(default)]
    pub post: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarmupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_warmup_steps")]
    pub steps: u32,
}
fn default_true() -> bool {
    true
}
fn default_warmup_steps() -> u32 {
    5
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionDelays {
    #[serde(default = "default_after_like")]
    pub after_like: (f64, f64),
    #[serde(default = "default_after_comment")]
    pub after_comment: (f64, f64),
    #[serde(default = "default_after_post")]
    pub after_post: (f64, f64),
    #[serde(default = "default_between_steps")]
    pub between_steps: (f64, f64),
}
fn default_after_like() -> (f64, f64) {
    (2.0, 5.0)
}
fn default_after_comment() -> (f64, f64) {
    (5.0, 15.0)
}
fn default_after_post() -> (f64, f64) {
    (30.0, 120.0)
}
fn default_between_steps() -> (f64, f64) {
    (3.0, 10.0)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BurstPrevention {
    #[serde(default = "default_max_consecutive")]
    pub max_consecutive_actions: u32,
    #[serde(default = "default_burst_cooldown")]
    pub cooldown_after_burst_secs: f64,
}
fn default_max_consecutive() -> u32 {
    3
}
fn default_burst_cooldown() -> f64 {
    60.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingPolicy {
    #[serde(default = "default_226_pause")]
    pub pause_minutes: f64,
    #[serde(default = "default_226_reduce")]
    pub reduce_probability: f32,
}
fn default_226_pause() -> f64 {
    30.0
}
fn default_226_reduce() -> f32 {
    0.5
}
impl Default for ErrorHandlingPolicy {
    fn default() -> Self {
        Self {
            pause_minutes: default_226_pause(),
            reduce_probability: default_226_reduce(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandling {
    #[serde(default)]
    pub on_226: ErrorHandlingPolicy,
    #[serde(default = "default_404_policy")]
    pub on_404: ErrorHandlingPolicy,
}
fn default_404_policy() -> ErrorHandlingPolicy {
    ErrorHandlingPolicy {
        pause_minutes: 5.0,
        reduce_probability: 1.0,
    }
}
impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            on_226: ErrorHandlingPolicy::default(),
            on_404: default_404_policy(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HumanLikeConfig {
    #[serde(default)]
    pub warmup: WarmupConfig,
    #[serde(default)]
    pub action_delays: ActionDelays,
    #[serde(default)]
    pub burst_prevention: BurstPrevention,
    #[serde(default)]
    pub error_handling: ErrorHandling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowBehavior {
    #[serde(default = "default_follow_threshold")]
    pub score_threshold: i32,
    #[serde(default = "default_follow_base_probability")]
    pub base_probability: f32,
    #[serde(default = "default_follow_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_follow_delay")]
    pub delay_range_secs: (f64, f64),
    #[serde(default)]
    pub bio_keywords: Vec<String>,
    #[serde(default = "default_min_bio_length")]
    pub min_bio_length: usize,
    #[serde(default = "default_min_ratio")]
    pub min_follower_following_ratio: f32,
    #[serde(default = "default_min_account_age_days")]
    pub min_account_age_days: u32,
    #[serde(default = "default_max_following_cap")]
    pub max_following_cap: u64,
}
fn default_follow_threshold() -> i32 {
    40
}
fn default_follow_base_probability() -> f32 {
    0.5
}
fn default_follow_daily_limit() -> u32 {
    20
}
fn default_follow_delay() -> (f64, f64) {
    (30.0, 300.0)
}
fn default_min_bio_length() -> usize {
    10
}
fn default_min_ratio() -> f32 {
    0.1
}
fn default_min_account_age_days() -> u32 {
    14
}
fn default_max_following_cap() -> u64 {
    7500
}

impl Default for FollowBehavior {
    fn default() -> Self {
        Self {
            score_threshold: default_follow_threshold(),
            base_probability: default_follow_base_probability(),
            daily_limit: default_follow_daily_limit(),
            delay_range_secs: default_follow_delay(),
            bio_keywords: Vec::new(),
            min_bio_length: default_min_bio_length(),
            min_follower_following_ratio: default_min_ratio(),
            min_account_age_days: default_min_account_age_days(),
            max_following_cap: default_max_following_cap(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HourlyActivityRange {
    /// Hour range label, e.g. "22-01" (supports wrap-around over midnight).
    pub hours: String,
    pub level: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepPattern {
    #[serde(default = "default_sleep_start")]
    pub sleep_start_hour: f32,
    #[serde(default = "default_wake_hour")]
    pub wake_hour: f32,
    #[serde(default)]
    pub sleep_start_variance: f32,
    #[serde(default)]
    pub wake_variance: f32,
    #[serde(default)]
    pub weekend_sleep_start_offset: f32,
    #[serde(default)]
    pub weekend_wake_offset: f32,
    #[serde(default)]
    pub late_night_probability: f32,
    #[serde(default)]
    pub early_wake_probability: f32,
    #[serde(default)]
    pub midnight_check_hour: Option<u32>,
}
fn default_sleep_start() -> f32 {
    1.0
}
fn default_wake_hour() -> f32 {
    8.0
}
impl Default for SleepPattern {
    fn default() -> Self {
        Self {
            sleep_start_hour: default_sleep_start(),
            wake_hour: default_wake_hour(),
            sleep_start_variance: 0.0,
            wake_variance: 0.0,
            weekend_sleep_start_offset: 0.0,
            weekend_wake_offset: 0.0,
            late_night_probability: 0.0,
            early_wake_probability: 0.0,
            midnight_check_hour: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RandomBreaks {
    #[serde(default)]
    pub probability: f32,
    #[serde(default = "default_break_min")]
    pub duration_min_secs: f64,
    #[serde(default = "default_break_max")]
    pub duration_max_secs: f64,
}
fn default_break_min() -> f64 {
    300.0
}
fn default_break_max() -> f64 {
    1800.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivitySchedule {
    #[serde(default)]
    pub sleep_pattern: SleepPattern,
    #[serde(default)]
    pub hourly_activity: Vec<HourlyActivityRange>,
    #[serde(default)]
    pub random_breaks: RandomBreaks,
    #[serde(default)]
    pub random_off_day_probability: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseBaseProbabilities {
    #[serde(default)]
    pub quip: f32,
    #[serde(default)]
    pub short: f32,
    #[serde(default)]
    pub normal: f32,
    #[serde(default)]
    pub long: f32,
    #[serde(default)]
    pub personal: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseStrategy {
    #[serde(default)]
    pub base_probabilities: ResponseBaseProbabilities,
    #[serde(default)]
    pub tweet_length_threshold: usize,
    #[serde(default)]
    pub short_text_override: String,
    #[serde(default)]
    pub high_relevance_long_boost: f32,
    #[serde(default)]
    pub high_relevance_personal_boost: f32,
    #[serde(default)]
    pub relevance_threshold: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentReview {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub fix_excessive_patterns: bool,
    #[serde(default)]
    pub patterns_to_moderate: Vec<String>,
    #[serde(default)]
    pub max_pattern_occurrences: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Behavior {
    #[serde(default)]
    pub interaction_patterns: InteractionPatterns,
    #[serde(default)]
    pub probability_model: ProbabilityModel,
    #[serde(default)]
    pub step_probabilities: StepProbabilities,
    #[serde(default)]
    pub human_like: HumanLikeConfig,
    #[serde(default)]
    pub follow_behavior: FollowBehavior,
    #[serde(default)]
    pub activity_schedule: ActivitySchedule,
    #[serde(default)]
    pub response_strategy: ResponseStrategy,
    #[serde(default)]
    pub content_review: ContentReview,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipHint {
    /// Handle pattern this entry matches against (substring or glob-lite).
    pub handle_pattern: String,
    pub relationship: String,
    #[serde(default)]
    pub interaction_style: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignatureSeries {
    pub name: String,
    #[serde(default)]
    pub cadence_hours: f64,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformModeConfig {
    #[serde(default)]
    pub session_interval_min_secs: f64,
    #[serde(default)]
    pub session_interval_max_secs: f64,
    #[serde(default)]
    pub warmup_steps: u32,
    #[serde(default)]
    pub honor_sleep: bool,
    #[serde(default)]
    pub honor_breaks: bool,
}

/// Top-level per-persona configuration, assembled from the package's
/// YAML files. Immutable for the lifetime of a run once loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Persona {
    pub persona_id: String,
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub speech_style: SpeechStyle,
    #[serde(default)]
    pub behavior: Behavior,
    #[serde(default)]
    pub relationships: Vec<RelationshipHint>,
    #[serde(default)]
    pub signature_series: Vec<SignatureSeries>,
    #[serde(default)]
    pub platform_modes: HashMap<String, PlatformModeConfig>,
    #[serde(default)]
    pub mode_weights: HashMap<String, f32>,
    /// Keys present in the package but not part of the closed schema;
    /// kept only for diagnostic logging, never consulted for behaviour.
    #[serde(default)]
    pub raw_unrecognized: HashMap<String, serde_json::Value>,
}

impl Persona {
    /// Loads a persona package directory. Recognised files:
    /// `identity.yaml`, `speech_style.yaml`, `behavior.yaml`,
    /// `relationships.yaml`, `signature_series.yaml`, `platform.yaml`.
    /// Missing files fall back to schema defaults; configuration errors
    /// here are fatal at startup per §7.
    pub fn load_dir(dir: &Path) -> AgentResult<Self> {
        let persona_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| AgentError::Config("persona directory has no name".into()))?;

        let mut persona = Persona {
            persona_id,
            ..Default::default()
        };

        if let Some(identity) = load_yaml::<Identity>(dir, "identity.yaml")? {
            persona.identity = identity;
        }
        if let Some(speech) = load_yaml::<SpeechStyle>(dir, "speech_style.yaml")? {
            persona.speech_style = speech;
        }
        if let Some(behavior) = load_yaml::<Behavior>(dir, "behavior.yaml")? {
            persona.behavior = behavior;
        }
        if let Some(rels) = load_yaml::<Vec<RelationshipHint>>(dir, "relationships.yaml")? {
            persona.relationships = rels;
        }
        if let Some(series) = load_yaml::<Vec<SignatureSeries>>(dir, "signature_series.yaml")? {
            persona.signature_series = series;
        }
        if let Some(platform) =
            load_yaml::<HashMap<String, PlatformModeConfig>>(dir, "platform.yaml")?
        {
            persona.platform_modes = platform;
        }
        if let Some(weights) = load_yaml::<HashMap<String, f32>>(dir, "mode_weights.yaml")? {
            persona.mode_weights = weights;
        }

        if persona.identity.name.is_empty() {
            return Err(AgentError::Config(format!(
                "persona '{}' is missing identity.name",
                persona.persona_id
            )));
        }

        Ok(persona)
    }

    /// Resolves a handle against `relationships` (first case-insensitive
    /// substring match wins).
    pub fn relationship_hint_for(&self, handle: &str) -> Option<&RelationshipHint> {
        let lower = handle.to_lowercase();
        self.relationships
            .iter()
            .find(|r| lower.contains(&r.handle_pattern.to_lowercase()))
    }
}

fn load_yaml<T: for<'de> Deserialize<'de>>(dir: &Path, filename: &str) -> AgentResult<Option<T>> {
    let path = dir.join(filename);
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .map_err(|e| AgentError::Config(format!("reading {}: {e}", path.display())))?;
    let value: T = serde_yaml::from_str(&text)
        .map_err(|e| AgentError::Config(format!("parsing {}: {e}", path.display())))?;
    Ok(Some(value))
}
