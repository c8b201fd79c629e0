//! Follow engine (§4.12): eligibility gates, scoring, and a delayed
//! execution queue with a daily cap and an emergency-pause latch.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use pf_core::persona::FollowBehavior;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct FollowCandidateProfile {
    pub user_id: String,
    pub screen_name: String,
    pub already_followed: bool,
    pub has_profile_image: bool,
    pub bio: String,
    pub follower_count: u64,
    pub following_count: u64,
    pub account_age_days: u32,
    pub follows_us: bool,
    pub prior_interaction_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowOutcome {
    Ineligible { reason: &'static str },
    ScoreBelowThreshold { score: i32 },
    RejectedByProbability { score: i32 },
    Queued { score: i32, execute_at_millis: i64 },
}

struct QueueItem {
    user_id: String,
    screen_name: String,
    execute_at: DateTime<Utc>,
}

pub struct FollowEngine {
    config: FollowBehavior,
    queue: VecDeque<QueueItem>,
    daily_count: u32,
    last_reset_date: chrono::NaiveDate,
    consecutive_errors: u32,
    emergency_pause_until: Option<DateTime<Utc>>,
}

impl FollowEngine {
    pub fn new(config: FollowBehavior) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            daily_count: 0,
            last_reset_date: Utc::now().date_naive(),
            consecutive_errors: 0,
            emergency_pause_until: None,
        }
    }

    fn roll_daily_reset(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.last_reset_date {
            self.daily_count = 0;
            self.last_reset_date = today;
        }
    }

    fn eligibility_gate(&self, candidate: &FollowCandidateProfile) -> Option<&'static str> {
        if candidate.already_followed {
            return Some("already followed");
        }
        if !candidate.has_profile_image {
            return Some("no profile image");
        }
        if candidate.bio.trim().len() < self.config.min_bio_length {
            return Some("empty or short bio");
        }
        let ratio = if candidate.following_count == 0 {
            f32::MAX
        } else {
            candidate.follower_count as f32 / candidate.following_count as f32
        };
        if ratio < self.config.min_follower_following_ratio {
            return Some("follower/following ratio below threshold");
        }
        if candidate.account_age_days < self.config.min_account_age_days {
            return Some("account age below threshold");
        }
        if candidate.following_count > self.config.max_following_cap {
            return Some("followings above cap");
        }
        None
    }

    fn score(&self, candidate: &FollowCandidateProfile) -> i32 {
        let mut score: i32 = 50;
        if candidate.follows_us {
            score += 30;
        }
        let matched_keywords = self
            .config
            .bio_keywords
            .iter()
            .filter(|kw| candidate.bio.to_lowercase().contains(&kw.to_lowercase()))
            .count() as i32;
        score += matched_keywords * 10;
        score += (candidate.prior_interaction_count as i32 * 5).min(20);
        if (100..=10_000).contains(&candidate.follower_count) {
            score += 10;
        } else if candidate.follower_count > 10_000 {
            score += 5;
        }
        if candidate.has_profile_image {
            score += 5;
        }
        if !candidate.bio.trim().is_empty() {
            score += 5;
        }
        score.clamp(0, 100)
    }

    /// Applies gates, scores the candidate, and on acceptance enqueues a
    /// delayed follow rather than acting synchronously.
    pub fn evaluate(&mut self, candidate: &FollowCandidateProfile, now: DateTime<Utc>, rng: &mut impl Rng) -> FollowOutcome {
        if let Some(reason) = self.eligibility_gate(candidate) {
            return FollowOutcome::Ineligible { reason };
        }
        let score = self.score(candidate);
        if score < self.config.score_threshold {
            return FollowOutcome::ScoreBelowThreshold { score };
        }
        let probability = (self.config.base_probability * (score as f32 / 50.0)).min(0.8);
        if !rng.random_bool(probability as f64) {
            return FollowOutcome::RejectedByProbability { score };
        }

        let (lo, hi) = self.config.delay_range_secs;
        let delay_secs = rng.random_range(lo..=hi.max(lo));
        let execute_at = now + chrono::Duration::milliseconds((delay_secs * 1000.0) as i64);
        self.queue.push_back(QueueItem {
            user_id: candidate.user_id.clone(),
            screen_name: candidate.screen_name.clone(),
            execute_at,
        });
        FollowOutcome::Queued {
            score,
            execute_at_millis: execute_at.timestamp_millis(),
        }
    }

    pub fn is_emergency_paused(&self, now: DateTime<Utc>) -> bool {
        self.emergency_pause_until.map(|until| now < until).unwrap_or(false)
    }

    /// Pops items whose `execute_at <= now`, up to `max_per_call`, invoking
    /// `follow_fn(user_id, screen_name) -> Result<(), ()>` for each. Three
    /// consecutive failures latch an emergency pause and stop the drain.
    pub fn process_queue(
        &mut self,
        now: DateTime<Utc>,
        max_per_call: usize,
        mut follow_fn: impl FnMut(&str, &str) -> Result<(), ()>,
    ) -> usize {
        self.roll_daily_reset(now);
        if self.is_emergency_paused(now) {
            return 0;
        }

        let mut processed = 0usize;
        while processed < max_per_call {
            if self.daily_count >= self.config.daily_limit {
                break;
            }
            let ready = matches!(self.queue.front(), Some(item) if item.execute_at <= now);
            if !ready {
                break;
            }
            let item = self.queue.pop_front().unwrap();
            match follow_fn(&item.user_id, &item.screen_name) {
                Ok(()) => {
                    self.consecutive_errors = 0;
                    self.daily_count += 1;
                    processed += 1;
                }
                Err(()) => {
                    self.consecutive_errors += 1;
                    if self.consecutive_errors >= 3 {
                        self.emergency_pause_until = Some(now + chrono::Duration::hours(1));
                        break;
                    }
                }
            }
        }
        processed
    }

    /// Async-friendly counterpart to `process_queue`: pops ready items
    /// without executing anything, so the caller can `.await` its own
    /// follow call per item and report the outcome back via
    /// `record_follow_attempt`.
    pub fn drain_ready(&mut self, now: DateTime<Utc>, max_per_call: usize) -> Vec<(String, String)> {
        self.roll_daily_reset(now);
        if self.is_emergency_paused(now) {
            return Vec::new();
        }
        let mut drained = Vec::new();
        let mut projected_count = self.daily_count;
        while drained.len() < max_per_call && projected_count < self.config.daily_limit {
            let ready = matches!(self.queue.front(), Some(item) if item.execute_at <= now);
            if !ready {
                break;
            }
            let item = self.queue.pop_front().unwrap();
            projected_count += 1;
            drained.push((item.user_id, item.screen_name));
        }
        drained
    }

    pub fn record_follow_attempt(&mut self, now: DateTime<Utc>, success: bool) {
        if success {
            self.consecutive_errors = 0;
            self.daily_count += 1;
        } else {
            self.consecutive_errors += 1;
            if self.consecutive_errors >= 3 {
                self.emergency_pause_until = Some(now + chrono::Duration::hours(1));
            }
        }
    }

    pub fn daily_count(&self) -> u32 {
        self.daily_count
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 29, 12, 0, 0).unwrap()
    }

    fn good_candidate() -> FollowCandidateProfile {
        FollowCandidateProfile {
            user_id: "u1".into(),
            screen_name: "chef_miso".into(),
            already_followed: false,
            has_profile_image: true,
            bio: "fermentation nerd, kimchi all day".into(),
            follower_count: 2000,
            following_count: 500,
            account_age_days: 365,
            follows_us: true,
            prior_interaction_count: 2,
        }
    }

    #[test]
    fn already_followed_is_ineligible() {
        let mut engine = FollowEngine::new(FollowBehavior::default());
        let mut candidate = good_candidate();
        candidate.already_followed = true;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let outcome = engine.evaluate(&candidate, now(), &mut rng);
        assert_eq!(outcome, FollowOutcome::Ineligible { reason: "already followed" });
    }

    #[test]
    fn high_score_candidate_with_base_probability_one_is_queued_not_acted_immediately() {
        let mut config = FollowBehavior::default();
        config.base_probability = 1.0;
        config.delay_range_secs = (30.0, 300.0);
        let mut engine = FollowEngine::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let outcome = engine.evaluate(&good_candidate(), now(), &mut rng);
        assert!(matches!(outcome, FollowOutcome::Queued { .. }));
        assert_eq!(engine.queue_len(), 1);
    }

    #[test]
    fn process_queue_before_execute_at_does_nothing() {
        let mut config = FollowBehavior::default();
        config.base_probability = 1.0;
        config.delay_range_secs = (30.0, 300.0);
        let mut engine = FollowEngine::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        engine.evaluate(&good_candidate(), now(), &mut rng);

        let processed = engine.process_queue(now() + chrono::Duration::seconds(10), 10, |_, _| Ok(()));
        assert_eq!(processed, 0);
        assert_eq!(engine.daily_count(), 0);

        let processed = engine.process_queue(now() + chrono::Duration::seconds(310), 10, |_, _| Ok(()));
        assert_eq!(processed, 1);
        assert_eq!(engine.daily_count(), 1);
    }

    #[test]
    fn drain_ready_respects_daily_limit_within_one_batch() {
        let mut config = FollowBehavior::default();
        config.base_probability = 1.0;
        config.daily_limit = 1;
        let mut engine = FollowEngine::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        engine.evaluate(&good_candidate(), now(), &mut rng);
        let mut second = good_candidate();
        second.user_id = "u2".into();
        engine.evaluate(&second, now(), &mut rng);

        let later = now() + chrono::Duration::seconds(400);
        let drained = engine.drain_ready(later, 10);
        assert_eq!(drained.len(), 1);
    }

    #[test]
    fn record_follow_attempt_tracks_daily_count_and_pause() {
        let mut engine = FollowEngine::new(FollowBehavior::default());
        let now = now();
        engine.record_follow_attempt(now, true);
        assert_eq!(engine.daily_count(), 1);
        engine.record_follow_attempt(now, false);
        engine.record_follow_attempt(now, false);
        engine.record_follow_attempt(now, false);
        assert!(engine.is_emergency_paused(now));
    }

    #[test]
    fn three_consecutive_errors_latch_emergency_pause() {
        let mut config = FollowBehavior::default();
        config.base_probability = 1.0;
        let mut engine = FollowEngine::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for i in 0..3u32 {
            let mut candidate = good_candidate();
            candidate.user_id = format!("u{i}");
            engine.evaluate(&candidate, now(), &mut rng);
        }
        let later = now() + chrono::Duration::seconds(400);
        let processed = engine.process_queue(later, 10, |_, _| Err(()));
        assert_eq!(processed, 0);
        assert!(engine.is_emergency_paused(later));
    }
}
