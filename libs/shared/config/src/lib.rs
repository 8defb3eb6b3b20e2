use std::env;
use tracing::warn;

/// Tunable scheduling policy, loaded from the environment with sane defaults.
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    /// Minimum notice a non-privileged caller must give to cancel, in hours.
    pub min_cancellation_notice_hours: i64,
    /// How long a waitlist offer stays open before it expires, in hours.
    pub offer_expiry_hours: i64,
    /// Priority points accrued per day spent waiting.
    pub wait_points_per_day: i64,
    /// Upper bound on the accrued wait-time score.
    pub wait_score_cap: i64,
    /// Upper bound on the externally supplied clinical urgency score.
    pub clinical_score_cap: i64,
    /// Flat bonus for appointment types that require pre-authorization.
    pub preauth_urgency_bonus: i64,
    /// Penalty per recent cancellation/no-show by the subject.
    pub cancellation_penalty: i64,
    /// Trailing window for counting recent cancellations, in days.
    pub cancellation_lookback_days: i64,
    /// Penalty per declined or expired offer on a waitlist entry.
    pub decline_penalty: i64,
    /// How far past `as_of` the matcher searches when an entry has no
    /// latest acceptable date, in days.
    pub match_horizon_days: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            min_cancellation_notice_hours: 24,
            offer_expiry_hours: 24,
            wait_points_per_day: 2,
            wait_score_cap: 50,
            clinical_score_cap: 100,
            preauth_urgency_bonus: 30,
            cancellation_penalty: 10,
            cancellation_lookback_days: 90,
            decline_penalty: 5,
            match_horizon_days: 90,
        }
    }
}

impl SchedulingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_cancellation_notice_hours: env_i64(
                "MIN_CANCELLATION_NOTICE_HOURS",
                defaults.min_cancellation_notice_hours,
            ),
            offer_expiry_hours: env_i64("OFFER_EXPIRY_HOURS", defaults.offer_expiry_hours),
            wait_points_per_day: env_i64("WAIT_POINTS_PER_DAY", defaults.wait_points_per_day),
            wait_score_cap: env_i64("WAIT_SCORE_CAP", defaults.wait_score_cap),
            clinical_score_cap: env_i64("CLINICAL_SCORE_CAP", defaults.clinical_score_cap),
            preauth_urgency_bonus: env_i64(
                "PREAUTH_URGENCY_BONUS",
                defaults.preauth_urgency_bonus,
            ),
            cancellation_penalty: env_i64("CANCELLATION_PENALTY", defaults.cancellation_penalty),
            cancellation_lookback_days: env_i64(
                "CANCELLATION_LOOKBACK_DAYS",
                defaults.cancellation_lookback_days,
            ),
            decline_penalty: env_i64("DECLINE_PENALTY", defaults.decline_penalty),
            match_horizon_days: env_i64("MATCH_HORIZON_DAYS", defaults.match_horizon_days),
        }
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    "{} is not a valid integer ({}), using default {}",
                    name, raw, default
                );
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let config = SchedulingConfig::default();
        assert_eq!(config.min_cancellation_notice_hours, 24);
        assert_eq!(config.offer_expiry_hours, 24);
        assert_eq!(config.wait_score_cap, 50);
        assert_eq!(config.cancellation_lookback_days, 90);
    }
}
