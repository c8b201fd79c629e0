//! Human-like controller (§4.2): warm-up, inter-action delays, burst
//! cooldown, and error-triggered pauses.

use std::collections::VecDeque;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use pf_core::persona::HumanLikeConfig;
use pf_core::AgentError;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Like,
    Comment,
    Post,
    BetweenSteps,
}

#[derive(Debug, Clone)]
struct ActionRecord {
    kind: String,
    at: DateTime<Utc>,
}

pub struct HumanLikeController {
    config: HumanLikeConfig,
    step_count: u32,
    session_action_count: u32,
    consecutive_action_count: u32,
    last_action_time: Option<DateTime<Utc>>,
    last_action_type: Option<String>,
    history: VecDeque<ActionRecord>,
    error_pause_until: Option<DateTime<Utc>>,
    probability_modifier: f32,
}

impl HumanLikeController {
    pub fn new(config: HumanLikeConfig) -> Self {
        Self {
            config,
            step_count: 0,
            session_action_count: 0,
            consecutive_action_count: 0,
            last_action_time: None,
            last_action_type: None,
            history: VecDeque::new(),
            error_pause_until: None,
            probability_modifier: 1.0,
        }
    }

    pub fn increment_step(&mut self) {
        self.step_count += 1;
    }

    pub fn probability_modifier(&self) -> f32 {
        self.probability_modifier
    }

    /// Returns `(can_act, reason_if_not)` per §4.2's three gates, checked
    /// in order: warm-up, active error pause, burst cooldown.
    pub fn can_take_action(&self, now: DateTime<Utc>) -> (bool, Option<String>) {
        if self.config.warmup.enabled && self.step_count < self.config.warmup.steps {
            return (false, Some("warming up".to_string()));
        }
        if let Some(until) = self.error_pause_until {
            if now < until {
                let remaining = (until - now).num_seconds();
                return (false, Some(format!("paused for error, {remaining}s remaining")));
            }
        }
        let burst = &self.config.burst_prevention;
        if self.consecutive_action_count >= burst.max_consecutive_actions {
            if let Some(last) = self.last_action_time {
                let elapsed = (now - last).num_milliseconds() as f64 / 1000.0;
                if elapsed < burst.cooldown_after_burst_secs {
                    return (false, Some("burst cooldown".to_string()));
                }
            }
        }
        (true, None)
    }

    /// Sleeps for a Uniform delay drawn from the configured range for
    /// `kind`. Callers on a cooperative event loop should prefer
    /// `tokio::time::sleep` so the wait remains a cancellable
    /// suspension point (§5).
    pub async fn apply_action_delay(&self, kind: ActionKind, rng: &mut impl Rng) {
        let (lo, hi) = match kind {
            ActionKind::Like => self.config.action_delays.after_like,
            ActionKind::Comment => self.config.action_delays.after_comment,
            ActionKind::Post => self.config.action_delays.after_post,
            ActionKind::BetweenSteps => self.config.action_delays.between_steps,
        };
        let secs = rng.random_range(lo..=hi.max(lo));
        tokio::time::sleep(StdDuration::from_secs_f64(secs)).await;
    }

    pub fn record_action(&mut self, kind: &str, now: DateTime<Utc>) {
        self.session_action_count += 1;

        let burst = &self.config.burst_prevention;
        let crossed_cooldown = self
            .last_action_time
            .map(|last| (now - last).num_milliseconds() as f64 / 1000.0 >= burst.cooldown_after_burst_secs)
            .unwrap_or(false);
        if crossed_cooldown {
            self.consecutive_action_count = 0;
        }
        self.consecutive_action_count += 1;

        self.last_action_time = Some(now);
        self.last_action_type = Some(kind.to_string());
        self.history.push_back(ActionRecord {
            kind: kind.to_string(),
            at: now,
        });
        if self.history.len() > 100 {
            while self.history.len() > 50 {
                self.history.pop_front();
            }
        }
    }

    /// Applies the error-escalation policy in §4.2: a throttle pauses
    /// longer and dampens future action probability; a transient
    /// not-found only pauses briefly.
    pub fn handle_error(&mut self, error: &AgentError, now: DateTime<Utc>) {
        match error {
            AgentError::AccountThrottle(_) => {
                let cfg = &self.config.error_handling.on_226;
                self.error_pause_until = Some(now + chrono::Duration::seconds((cfg.pause_minutes * 60.0) as i64));
                self.probability_modifier *= cfg.reduce_probability;
            }
            AgentError::NotFound(_) => {
                let cfg = &self.config.error_handling.on_404;
                self.error_pause_until = Some(now + chrono::Duration::seconds((cfg.pause_minutes * 60.0) as i64));
            }
            _ => {}
        }
    }

    pub fn action_history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pf_core::persona::{BurstPrevention, WarmupConfig};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 29, 12, 0, 0).unwrap()
    }

    #[test]
    fn warmup_blocks_actions_until_step_threshold() {
        let mut config = HumanLikeConfig::default();
        config.warmup = WarmupConfig { enabled: true, steps: 3 };
        let controller = HumanLikeController::new(config);
        let (ok, reason) = controller.can_take_action(now());
        assert!(!ok);
        assert!(reason.unwrap().contains("warming"));
    }

    #[test]
    fn burst_cooldown_blocks_after_max_consecutive() {
        let mut config = HumanLikeConfig::default();
        config.warmup = WarmupConfig { enabled: false, steps: 0 };
        config.burst_prevention = BurstPrevention {
            max_consecutive_actions: 2,
            cooldown_after_burst_secs: 60.0,
        };
        let mut controller = HumanLikeController::new(config);
        controller.record_action("like", now());
        controller.record_action("like", now());
        let (ok, reason) = controller.can_take_action(now());
        assert!(!ok);
        assert!(reason.unwrap().contains("burst"));
    }

    #[test]
    fn throttle_error_pauses_and_dampens_probability() {
        let mut controller = HumanLikeController::new(HumanLikeConfig::default());
        let before = controller.probability_modifier();
        controller.handle_error(&AgentError::AccountThrottle("226".into()), now());
        assert!(controller.probability_modifier() < before);
        let (ok, _) = controller.can_take_action(now());
        assert!(!ok);
    }

    #[test]
    fn history_caps_at_one_hundred_entries() {
        let mut config = HumanLikeConfig::default();
        config.warmup = WarmupConfig { enabled: false, steps: 0 };
        config.burst_prevention = BurstPrevention {
            max_consecutive_actions: 10_000,
            cooldown_after_burst_secs: 0.0,
        };
        let mut controller = HumanLikeController::new(config);
        for i in 0..120 {
            controller.record_action("like", now() + chrono::Duration::seconds(i));
        }
        assert!(controller.action_history_len() <= 100);
    }
}
