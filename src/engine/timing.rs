//! Timing coefficient: how far ahead of kick-off a prediction was submitted.
//!
//! A step function of `event_start - submitted_at`, closed on the lower
//! bound of each band. The multiplier is recorded once at grading time and
//! never recomputed.

use crate::domain::Points;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const HOUR_SECS: i64 = 3600;

/// Named band of the timing coefficient function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingTier {
    Standard,
    LastMinute,
    Timely,
    AheadOfTime,
    EarlyBird,
}

impl TimingTier {
    pub fn multiplier(&self) -> Points {
        match self {
            TimingTier::Standard => Points::one(),
            TimingTier::LastMinute => Points::from_parts(11, 1),
            TimingTier::Timely => Points::from_parts(125, 2),
            TimingTier::AheadOfTime => Points::from_parts(15, 1),
            TimingTier::EarlyBird => Points::from_parts(20, 1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimingTier::Standard => "standard",
            TimingTier::LastMinute => "last_minute",
            TimingTier::Timely => "timely",
            TimingTier::AheadOfTime => "ahead_of_time",
            TimingTier::EarlyBird => "early_bird",
        }
    }
}

/// Classify a submission instant against the event start.
///
/// Submissions at or after kick-off (negative delta) earn the standard 1.0.
pub fn timing_tier(submitted_at: DateTime<Utc>, event_start: DateTime<Utc>) -> TimingTier {
    let delta_secs = (event_start - submitted_at).num_seconds();

    if delta_secs >= 168 * HOUR_SECS {
        TimingTier::EarlyBird
    } else if delta_secs >= 72 * HOUR_SECS {
        TimingTier::AheadOfTime
    } else if delta_secs >= 24 * HOUR_SECS {
        TimingTier::Timely
    } else if delta_secs >= 12 * HOUR_SECS {
        TimingTier::LastMinute
    } else {
        TimingTier::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap()
    }

    fn tier_at_hours_before(hours: i64) -> TimingTier {
        timing_tier(start() - Duration::hours(hours), start())
    }

    #[test]
    fn test_bands() {
        assert_eq!(tier_at_hours_before(0), TimingTier::Standard);
        assert_eq!(tier_at_hours_before(6), TimingTier::Standard);
        assert_eq!(tier_at_hours_before(18), TimingTier::LastMinute);
        assert_eq!(tier_at_hours_before(48), TimingTier::Timely);
        assert_eq!(tier_at_hours_before(100), TimingTier::AheadOfTime);
        assert_eq!(tier_at_hours_before(200), TimingTier::EarlyBird);
    }

    #[test]
    fn test_lower_bounds_are_closed() {
        assert_eq!(tier_at_hours_before(12), TimingTier::LastMinute);
        assert_eq!(tier_at_hours_before(24), TimingTier::Timely);
        assert_eq!(tier_at_hours_before(72), TimingTier::AheadOfTime);
        assert_eq!(tier_at_hours_before(168), TimingTier::EarlyBird);
    }

    #[test]
    fn test_just_below_boundary_stays_in_lower_band() {
        let tier = timing_tier(
            start() - Duration::hours(168) + Duration::seconds(1),
            start(),
        );
        assert_eq!(tier, TimingTier::AheadOfTime);
    }

    #[test]
    fn test_late_submission_is_standard() {
        let tier = timing_tier(start() + Duration::hours(1), start());
        assert_eq!(tier, TimingTier::Standard);
        assert_eq!(tier.multiplier(), Points::one());
    }

    #[test]
    fn test_multiplier_values() {
        assert_eq!(
            TimingTier::LastMinute.multiplier(),
            Points::from_str_canonical("1.1").unwrap()
        );
        assert_eq!(
            TimingTier::Timely.multiplier(),
            Points::from_str_canonical("1.25").unwrap()
        );
        assert_eq!(
            TimingTier::AheadOfTime.multiplier(),
            Points::from_str_canonical("1.5").unwrap()
        );
        assert_eq!(
            TimingTier::EarlyBird.multiplier(),
            Points::from_str_canonical("2").unwrap()
        );
    }

    #[test]
    fn test_monotone_in_delta() {
        let mut last = Points::zero();
        for hours in [0, 6, 12, 24, 72, 168, 500] {
            let m = tier_at_hours_before(hours).multiplier();
            assert!(m >= last, "multiplier decreased at {}h", hours);
            last = m;
        }
    }
}
