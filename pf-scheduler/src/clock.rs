//! Clock & activity scheduler (§4.1): derives a daily sleep/wake
//! schedule from persona configuration plus noise, and answers whether
//! the agent should be active right now.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use pf_core::persona::ActivitySchedule;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Active,
    Asleep,
    OffDay,
    OnBreak,
    MidnightCheck,
}

#[derive(Debug, Clone)]
struct DailyDerivedSchedule {
    date: NaiveDate,
    sleep_start_hour: f32,
    wake_hour: f32,
    is_off_day: bool,
}

pub struct ActivityScheduler {
    config: ActivitySchedule,
    derived: Option<DailyDerivedSchedule>,
    break_until: Option<DateTime<Utc>>,
}

pub struct TickResult {
    pub is_active: bool,
    pub state: ActivityState,
    pub next_active_time: Option<DateTime<Utc>>,
}

impl ActivityScheduler {
    pub fn new(config: ActivitySchedule) -> Self {
        Self {
            config,
            derived: None,
            break_until: None,
        }
    }

    fn ensure_daily_schedule(&mut self, now: DateTime<Utc>, rng: &mut impl Rng) {
        let today = now.date_naive();
        if self.derived.as_ref().map(|d| d.date) == Some(today) {
            return;
        }

        let p = &self.config.sleep_pattern;
        let is_weekend = matches!(now.weekday(), Weekday::Sat | Weekday::Sun);

        let mut sleep_start = p.sleep_start_hour
            + jitter(rng, p.sleep_start_variance)
            + if is_weekend { p.weekend_sleep_start_offset } else { 0.0 };
        let mut wake = p.wake_hour
            + jitter(rng, p.wake_variance)
            + if is_weekend { p.weekend_wake_offset } else { 0.0 };

        if rng.random_bool(p.late_night_probability as f64) {
            sleep_start += 1.5;
        }
        if rng.random_bool(p.early_wake_probability as f64) {
            wake -= 1.0;
        }

        sleep_start = sleep_start.clamp(0.0, 5.0);
        wake = wake.clamp(5.0, 12.0);

        let is_off_day = rng.random_bool(self.config.random_off_day_probability as f64);

        self.derived = Some(DailyDerivedSchedule {
            date: today,
            sleep_start_hour: sleep_start,
            wake_hour: wake,
            is_off_day,
        });
    }

    fn is_sleeping(&self, now: DateTime<Utc>) -> bool {
        let derived = self.derived.as_ref().unwrap();
        let hour = now.hour() as f32 + now.minute() as f32 / 60.0;
        let s = derived.sleep_start_hour;
        let w = derived.wake_hour;
        if s == w {
            return true; // always-sleeping boundary case
        }
        if s < w {
            hour >= s && hour < w
        } else {
            hour >= s || hour < w
        }
    }

    fn is_midnight_check(&self, now: DateTime<Utc>) -> bool {
        match self.config.sleep_pattern.midnight_check_hour {
            Some(h) => now.hour() == h,
            None => false,
        }
    }

    /// Latches a break with the configured probability. Returns true if
    /// a break is active (newly latched or still in progress).
    pub fn should_take_break(&mut self, now: DateTime<Utc>, rng: &mut impl Rng) -> bool {
        if let Some(until) = self.break_until {
            if now < until {
                return true;
            }
            self.break_until = None;
        }
        let cfg = &self.config.random_breaks;
        if rng.random_bool(cfg.probability as f64) {
            let secs = rng.random_range(cfg.duration_min_secs..=cfg.duration_max_secs.max(cfg.duration_min_secs));
            self.break_until = Some(now + chrono::Duration::seconds(secs as i64));
            return true;
        }
        false
    }

    pub fn tick(&mut self, now: DateTime<Utc>, rng: &mut impl Rng) -> TickResult {
        self.ensure_daily_schedule(now, rng);
        let derived = self.derived.clone().unwrap();

        if derived.is_off_day {
            let next_midnight = (now.date_naive() + chrono::Duration::days(1))
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc();
            return TickResult {
                is_active: false,
                state: ActivityState::OffDay,
                next_active_time: Some(next_midnight),
            };
        }

        if self.is_midnight_check(now) {
            return TickResult {
                is_active: true,
                state: ActivityState::MidnightCheck,
                next_active_time: None,
            };
        }

        if self.is_sleeping(now) {
            let wake_time = next_occurrence_of_hour(now, derived.wake_hour);
            return TickResult {
                is_active: false,
                state: ActivityState::Asleep,
                next_active_time: Some(wake_time),
            };
        }

        if self.should_take_break(now, rng) {
            return TickResult {
                is_active: false,
                state: ActivityState::OnBreak,
                next_active_time: self.break_until,
            };
        }

        TickResult {
            is_active: true,
            state: ActivityState::Active,
            next_active_time: None,
        }
    }

    /// Piecewise activity level by hour, supporting wrap-around ranges
    /// like "22-01". Defaults to 0.5 when no configured range matches.
    pub fn activity_level(&self, now: DateTime<Utc>) -> f32 {
        let hour = now.hour();
        for range in &self.config.hourly_activity {
            if let Some((start, end)) = parse_hour_range(&range.hours) {
                let in_range = if start <= end {
                    hour >= start && hour < end
                } else {
                    hour >= start || hour < end
                };
                if in_range {
                    return range.level;
                }
            }
        }
        0.5
    }
}

fn jitter(rng: &mut impl Rng, variance: f32) -> f32 {
    if variance <= 0.0 {
        0.0
    } else {
        rng.random_range(-variance..=variance)
    }
}

fn next_occurrence_of_hour(now: DateTime<Utc>, hour: f32) -> DateTime<Utc> {
    let hour_u = hour.floor() as u32 % 24;
    let today_target = now
        .date_naive()
        .and_hms_opt(hour_u, 0, 0)
        .unwrap()
        .and_utc();
    if today_target > now {
        today_target
    } else {
        today_target + chrono::Duration::days(1)
    }
}

fn parse_hour_range(spec: &str) -> Option<(u32, u32)> {
    let (a, b) = spec.split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pf_core::persona::{HourlyActivityRange, RandomBreaks, SleepPattern};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 29, hour, minute, 0).unwrap() // a Wednesday
    }

    #[test]
    fn wake_equal_sleep_start_is_always_sleeping() {
        let mut cfg = ActivitySchedule::default();
        cfg.sleep_pattern = SleepPattern {
            sleep_start_hour: 3.0,
            wake_hour: 3.0,
            ..Default::default()
        };
        let mut scheduler = ActivityScheduler::new(cfg);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = scheduler.tick(at(10, 0), &mut rng);
        assert!(!result.is_active);
        assert_eq!(result.state, ActivityState::Asleep);
    }

    #[test]
    fn off_day_forces_inactive_until_midnight() {
        let mut cfg = ActivitySchedule::default();
        cfg.random_off_day_probability = 1.0;
        cfg.sleep_pattern = SleepPattern {
            sleep_start_hour: 1.0,
            wake_hour: 8.0,
            ..Default::default()
        };
        let mut scheduler = ActivityScheduler::new(cfg);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let result = scheduler.tick(at(14, 0), &mut rng);
        assert!(!result.is_active);
        assert_eq!(result.state, ActivityState::OffDay);
    }

    #[test]
    fn activity_level_handles_wraparound_ranges() {
        let mut cfg = ActivitySchedule::default();
        cfg.hourly_activity.push(HourlyActivityRange {
            hours: "22-01".into(),
            level: 0.2,
        });
        let scheduler = ActivityScheduler::new(cfg);
        assert_eq!(scheduler.activity_level(at(23, 0)), 0.2);
        assert_eq!(scheduler.activity_level(at(0, 30)), 0.2);
        assert_eq!(scheduler.activity_level(at(12, 0)), 0.5);
    }

    #[test]
    fn breaks_latch_until_a_future_time() {
        let mut cfg = ActivitySchedule::default();
        cfg.random_breaks = RandomBreaks {
            probability: 1.0,
            duration_min_secs: 60.0,
            duration_max_secs: 60.0,
        };
        let mut scheduler = ActivityScheduler::new(cfg);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let now = at(13, 0);
        assert!(scheduler.should_take_break(now, &mut rng));
        // still within the latched window regardless of further rolls
        assert!(scheduler.should_take_break(now + chrono::Duration::seconds(30), &mut rng));
    }

    #[test]
    fn zero_probability_never_latches_a_break() {
        let mut cfg = ActivitySchedule::default();
        cfg.random_breaks = RandomBreaks {
            probability: 0.0,
            duration_min_secs: 60.0,
            duration_max_secs: 60.0,
        };
        let mut scheduler = ActivityScheduler::new(cfg);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert!(!scheduler.should_take_break(at(13, 0), &mut rng));
    }
}
