//! Mode manager (§4.3): selects among {normal, test, aggressive}, each
//! with its own session interval, warm-up, and probability overrides,
//! and escalates to a safe mode on repeated errors.

use chrono::{DateTime, Utc};
use pf_core::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    Normal,
    Test,
    Aggressive,
}

#[derive(Debug, Clone)]
pub struct ModeConfig {
    pub session_interval_min_secs: f64,
    pub session_interval_max_secs: f64,
    pub warmup_steps: u32,
    pub honor_sleep: bool,
    pub honor_breaks: bool,
    /// Overrides for step-level probabilities; `None` defers to persona
    /// config (only `normal` does this).
    pub step_probability_overrides: Option<(f32, f32, f32, f32)>, // scout, mentions, reply_check, post
    pub action_probability_overrides: Option<(f32, f32, f32)>, // like, repost, comment
}

fn config_for(mode: AgentMode) -> ModeConfig {
    match mode {
        AgentMode::Normal => ModeConfig {
            session_interval_min_secs: 300.0,
            session_interval_max_secs: 900.0,
            warmup_steps: 5,
            honor_sleep: true,
            honor_breaks: true,
            step_probability_overrides: None,
            action_probability_overrides: None,
        },
        AgentMode::Test => ModeConfig {
            session_interval_min_secs: 5.0,
            session_interval_max_secs: 15.0,
            warmup_steps: 0,
            honor_sleep: false,
            honor_breaks: false,
            step_probability_overrides: Some((1.0, 1.0, 1.0, 1.0)),
            action_probability_overrides: Some((1.0, 1.0, 1.0)),
        },
        AgentMode::Aggressive => ModeConfig {
            session_interval_min_secs: 60.0,
            session_interval_max_secs: 180.0,
            warmup_steps: 2,
            honor_sleep: true,
            honor_breaks: false,
            step_probability_overrides: Some((0.8, 0.9, 0.9, 0.5)),
            action_probability_overrides: Some((0.9, 0.7, 0.6)),
        },
    }
}

pub struct ModeManager {
    mode: AgentMode,
    consecutive_errors: u32,
    daily_action_count: u32,
    daily_action_cap: u32,
    last_reset_date: chrono::NaiveDate,
    forced_pause_until: Option<DateTime<Utc>>,
}

pub enum ErrorOutcome {
    Continue,
    Pause { until: DateTime<Utc> },
}

impl ModeManager {
    pub fn new(initial_mode: AgentMode, daily_action_cap: u32) -> Self {
        Self {
            mode: initial_mode,
            consecutive_errors: 0,
            daily_action_count: 0,
            daily_action_cap,
            last_reset_date: Utc::now().date_naive(),
            forced_pause_until: None,
        }
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    pub fn config(&self) -> ModeConfig {
        config_for(self.mode)
    }

    fn roll_daily_reset_if_needed(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.last_reset_date {
            self.daily_action_count = 0;
            self.last_reset_date = today;
        }
    }

    pub fn on_success(&mut self, now: DateTime<Utc>) {
        self.roll_daily_reset_if_needed(now);
        self.consecutive_errors = 0;
        self.daily_action_count += 1;
    }

    pub fn daily_cap_reached(&self, now: DateTime<Utc>) -> bool {
        if now.date_naive() != self.last_reset_date {
            return false;
        }
        self.daily_action_count >= self.daily_action_cap
    }

    /// Escalates on repeated errors per §4.3: three consecutive errors,
    /// or an account-level throttle while in `aggressive`, forces
    /// `normal` and latches a pause.
    pub fn on_error(&mut self, error: &AgentError, now: DateTime<Utc>) -> ErrorOutcome {
        self.consecutive_errors += 1;
        let throttle_in_aggressive = self.mode == AgentMode::Aggressive && error.is_account_throttle();

        if self.consecutive_errors >= 3 || throttle_in_aggressive {
            self.mode = AgentMode::Normal;
            self.consecutive_errors = 0;
            let until = now + chrono::Duration::minutes(15);
            self.forced_pause_until = Some(until);
            return ErrorOutcome::Pause { until };
        }
        ErrorOutcome::Continue
    }

    pub fn forced_pause_until(&self) -> Option<DateTime<Utc>> {
        self.forced_pause_until
    }

    pub fn set_mode(&mut self, mode: AgentMode) {
        self.mode = mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 29, 12, 0, 0).unwrap()
    }

    #[test]
    fn three_consecutive_errors_force_normal_and_pause() {
        let mut mgr = ModeManager::new(AgentMode::Aggressive, 100);
        mgr.on_error(&AgentError::Transient("x".into()), now());
        mgr.on_error(&AgentError::Transient("x".into()), now());
        let outcome = mgr.on_error(&AgentError::Transient("x".into()), now());
        assert!(matches!(outcome, ErrorOutcome::Pause { .. }));
        assert_eq!(mgr.mode(), AgentMode::Normal);
    }

    #[test]
    fn single_throttle_in_aggressive_forces_normal_immediately() {
        let mut mgr = ModeManager::new(AgentMode::Aggressive, 100);
        let outcome = mgr.on_error(&AgentError::AccountThrottle("226".into()), now());
        assert!(matches!(outcome, ErrorOutcome::Pause { .. }));
        assert_eq!(mgr.mode(), AgentMode::Normal);
    }

    #[test]
    fn success_resets_consecutive_errors() {
        let mut mgr = ModeManager::new(AgentMode::Normal, 100);
        mgr.on_error(&AgentError::Transient("x".into()), now());
        mgr.on_success(now());
        mgr.on_error(&AgentError::Transient("x".into()), now());
        mgr.on_error(&AgentError::Transient("x".into()), now());
        let outcome = mgr.on_error(&AgentError::Transient("x".into()), now());
        // three consecutive errors with no intervening success still pauses
        assert!(matches!(outcome, ErrorOutcome::Pause { .. }));
    }

    #[test]
    fn daily_cap_blocks_after_limit() {
        let mut mgr = ModeManager::new(AgentMode::Normal, 2);
        mgr.on_success(now());
        mgr.on_success(now());
        assert!(mgr.daily_cap_reached(now()));
    }
}
