use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::HybridTimeouts;

/// Minimum samples before any re-tuning happens.
const MIN_ATTEMPTS_TO_TUNE: u32 = 5;
/// Hysteresis between tunings, to avoid thrashing on bursty traffic.
const TUNE_COOLDOWN_SECS: i64 = 60;

const GROW_FACTOR: f64 = 1.2;
const SHRINK_FACTOR: f64 = 0.9;
/// Learned values never leave the 0.5x-2x band around the configured
/// defaults, so noisy samples cannot cause runaway drift.
const MIN_SCALE: f64 = 0.5;
const MAX_SCALE: f64 = 2.0;

/// Self-tuning record of how long agents on one platform take to start
/// and finish responding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformTimeoutProfile {
    pub platform: String,
    pub activation_ms: u64,
    pub check_interval_ms: u64,
    pub initial_delay_ms: u64,
    pub success_count: u32,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tuned_at: Option<DateTime<Utc>>,
}

impl PlatformTimeoutProfile {
    fn fresh(platform: &str, defaults: HybridTimeouts) -> Self {
        Self {
            platform: platform.to_string(),
            activation_ms: defaults.activation_ms,
            check_interval_ms: defaults.check_interval_ms,
            initial_delay_ms: defaults.initial_delay_ms,
            success_count: 0,
            attempt_count: 0,
            last_tuned_at: None,
        }
    }

    fn timeouts(&self) -> HybridTimeouts {
        HybridTimeouts {
            activation_ms: self.activation_ms,
            check_interval_ms: self.check_interval_ms,
            initial_delay_ms: self.initial_delay_ms,
        }
    }
}

/// Per-platform learner over hybrid exchange outcomes. Conservative by
/// construction: grows on evidence of cutting agents off, shrinks only
/// when responses are reliably fast, and always stays clamped to the
/// band around the configured defaults.
#[derive(Debug, Clone)]
pub struct TimeoutProfileLearner {
    defaults: HybridTimeouts,
    profiles: HashMap<String, PlatformTimeoutProfile>,
}

impl TimeoutProfileLearner {
    pub fn new(defaults: HybridTimeouts) -> Self {
        Self {
            defaults,
            profiles: HashMap::new(),
        }
    }

    /// Rebuild from the persisted `timeout_profiles` blob.
    pub fn from_saved(
        defaults: HybridTimeouts,
        profiles: HashMap<String, PlatformTimeoutProfile>,
    ) -> Self {
        Self { defaults, profiles }
    }

    pub fn profiles(&self) -> &HashMap<String, PlatformTimeoutProfile> {
        &self.profiles
    }

    /// Learned timeouts for a platform once it has at least one observed
    /// attempt; configured defaults before that.
    pub fn profile_for(&self, platform: &str) -> HybridTimeouts {
        match self.profiles.get(platform) {
            Some(profile) if profile.attempt_count >= 1 => profile.timeouts(),
            _ => self.defaults,
        }
    }

    pub fn record(
        &mut self,
        platform: &str,
        timeout_used_ms: u64,
        observed_response_ms: u64,
        succeeded: bool,
        was_cutoff: bool,
    ) {
        self.record_at(
            Utc::now(),
            platform,
            timeout_used_ms,
            observed_response_ms,
            succeeded,
            was_cutoff,
        );
    }

    pub fn record_at(
        &mut self,
        now: DateTime<Utc>,
        platform: &str,
        timeout_used_ms: u64,
        observed_response_ms: u64,
        succeeded: bool,
        was_cutoff: bool,
    ) {
        let defaults = self.defaults;
        let profile = self
            .profiles
            .entry(platform.to_string())
            .or_insert_with(|| PlatformTimeoutProfile::fresh(platform, defaults));

        profile.attempt_count += 1;
        if succeeded {
            profile.success_count += 1;
        }

        if profile.attempt_count < MIN_ATTEMPTS_TO_TUNE {
            return;
        }
        if let Some(last) = profile.last_tuned_at {
            if now - last < Duration::seconds(TUNE_COOLDOWN_SECS) {
                return;
            }
        }

        if was_cutoff {
            // Evidence of cutting the agent off: lean toward patience.
            profile.check_interval_ms =
                scale_clamped(profile.check_interval_ms, GROW_FACTOR, defaults.check_interval_ms);
            profile.initial_delay_ms =
                scale_clamped(profile.initial_delay_ms, GROW_FACTOR, defaults.initial_delay_ms);
            profile.last_tuned_at = Some(now);
            tracing::debug!(
                "Grew hybrid timeouts for '{}': check_interval={}ms initial_delay={}ms",
                platform,
                profile.check_interval_ms,
                profile.initial_delay_ms
            );
        } else if succeeded
            && observed_response_ms * 2 < timeout_used_ms
            && profile.success_count as f64 / profile.attempt_count as f64 > 0.8
        {
            // Reliably fast responses: shrink, but never below half the
            // baseline.
            profile.check_interval_ms =
                scale_clamped(profile.check_interval_ms, SHRINK_FACTOR, defaults.check_interval_ms);
            profile.initial_delay_ms =
                scale_clamped(profile.initial_delay_ms, SHRINK_FACTOR, defaults.initial_delay_ms);
            profile.last_tuned_at = Some(now);
            tracing::debug!(
                "Shrank hybrid timeouts for '{}': check_interval={}ms initial_delay={}ms",
                platform,
                profile.check_interval_ms,
                profile.initial_delay_ms
            );
        }
    }
}

fn scale_clamped(value: u64, factor: f64, default: u64) -> u64 {
    let scaled = (value as f64 * factor).round() as u64;
    let floor = (default as f64 * MIN_SCALE).round() as u64;
    let ceiling = (default as f64 * MAX_SCALE).round() as u64;
    scaled.clamp(floor, ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> HybridTimeouts {
        HybridTimeouts {
            activation_ms: 1000,
            check_interval_ms: 2000,
            initial_delay_ms: 4000,
        }
    }

    fn minutes_apart(n: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
            + Duration::minutes(n)
    }

    #[test]
    fn profile_for_unknown_platform_returns_defaults() {
        let learner = TimeoutProfileLearner::new(defaults());
        assert_eq!(learner.profile_for("chatgpt"), defaults());
    }

    #[test]
    fn profile_for_returns_learned_values_after_first_attempt() {
        let mut learner = TimeoutProfileLearner::new(defaults());
        learner.record_at(minutes_apart(0), "chatgpt", 2000, 900, true, false);

        // One attempt, no tuning yet: values equal defaults but come from
        // the profile.
        assert_eq!(learner.profile_for("chatgpt"), defaults());
        assert_eq!(learner.profiles()["chatgpt"].attempt_count, 1);
    }

    #[test]
    fn no_tuning_before_five_attempts() {
        let mut learner = TimeoutProfileLearner::new(defaults());
        for i in 0..4 {
            learner.record_at(minutes_apart(i), "chatgpt", 2000, 10_000, false, true);
        }
        assert_eq!(learner.profile_for("chatgpt"), defaults());
    }

    #[test]
    fn cutoff_grows_check_interval_and_initial_delay() {
        let mut learner = TimeoutProfileLearner::new(defaults());
        for i in 0..5 {
            learner.record_at(minutes_apart(i * 2), "chatgpt", 2000, 10_000, false, true);
        }

        let learned = learner.profile_for("chatgpt");
        assert_eq!(learned.check_interval_ms, 2400);
        assert_eq!(learned.initial_delay_ms, 4800);
        assert_eq!(learned.activation_ms, 1000);
    }

    #[test]
    fn fast_reliable_successes_shrink_timeouts() {
        let mut learner = TimeoutProfileLearner::new(defaults());
        for i in 0..5 {
            learner.record_at(minutes_apart(i * 2), "claude", 2000, 500, true, false);
        }

        let learned = learner.profile_for("claude");
        assert_eq!(learned.check_interval_ms, 1800);
        assert_eq!(learned.initial_delay_ms, 3600);
    }

    #[test]
    fn slow_successes_leave_profile_unchanged() {
        let mut learner = TimeoutProfileLearner::new(defaults());
        for i in 0..6 {
            // Succeeded, but not fast: observed >= half the timeout.
            learner.record_at(minutes_apart(i * 2), "claude", 2000, 1500, true, false);
        }
        assert_eq!(learner.profile_for("claude"), defaults());
    }

    #[test]
    fn low_success_rate_blocks_shrinking() {
        let mut learner = TimeoutProfileLearner::new(defaults());
        // Three failures, then fast successes: rate stays <= 0.8 for a
        // while and shrinking must wait.
        for i in 0..3 {
            learner.record_at(minutes_apart(i * 2), "claude", 2000, 0, false, false);
        }
        for i in 3..5 {
            learner.record_at(minutes_apart(i * 2), "claude", 2000, 100, true, false);
        }
        assert_eq!(learner.profile_for("claude"), defaults());
    }

    #[test]
    fn tuning_respects_cooldown() {
        let mut learner = TimeoutProfileLearner::new(defaults());
        let t0 = minutes_apart(0);
        for _ in 0..5 {
            learner.record_at(t0, "chatgpt", 2000, 10_000, false, true);
        }
        // First tune happened at t0; a cutoff 30s later must not re-tune.
        learner.record_at(
            t0 + Duration::seconds(30),
            "chatgpt",
            2000,
            10_000,
            false,
            true,
        );
        assert_eq!(learner.profile_for("chatgpt").check_interval_ms, 2400);

        // After the cooldown it tunes again.
        learner.record_at(t0 + Duration::seconds(61), "chatgpt", 2000, 10_000, false, true);
        assert_eq!(learner.profile_for("chatgpt").check_interval_ms, 2880);
    }

    #[test]
    fn growth_is_clamped_at_twice_defaults() {
        let mut learner = TimeoutProfileLearner::new(defaults());
        for i in 0..40 {
            learner.record_at(minutes_apart(i * 2), "chatgpt", 2000, 10_000, false, true);
        }

        let learned = learner.profile_for("chatgpt");
        assert_eq!(learned.check_interval_ms, 4000);
        assert_eq!(learned.initial_delay_ms, 8000);
    }

    #[test]
    fn shrinking_is_clamped_at_half_defaults() {
        let mut learner = TimeoutProfileLearner::new(defaults());
        for i in 0..80 {
            learner.record_at(minutes_apart(i * 2), "claude", 20_000, 100, true, false);
        }

        let learned = learner.profile_for("claude");
        assert_eq!(learned.check_interval_ms, 1000);
        assert_eq!(learned.initial_delay_ms, 2000);
    }

    #[test]
    fn from_saved_restores_profiles() {
        let mut learner = TimeoutProfileLearner::new(defaults());
        for i in 0..5 {
            learner.record_at(minutes_apart(i * 2), "chatgpt", 2000, 10_000, false, true);
        }

        let restored =
            TimeoutProfileLearner::from_saved(defaults(), learner.profiles().clone());
        assert_eq!(restored.profile_for("chatgpt").check_interval_ms, 2400);
    }
}
