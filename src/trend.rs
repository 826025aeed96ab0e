//! Rolling trend baselines and directional deltas.
//!
//! Every snapshot carries one stored baseline per reporting window
//! (24h/7d/30d). When a fresh observation arrives, a window whose duration
//! has elapsed since its last roll takes the rank it is replacing as the
//! new baseline and restarts its clock; until then the stored baseline is
//! carried forward untouched. All three windows are gated the same way.
//!
//! Lower rank numbers are better positions, so the display delta is
//! `baseline - current`: moving from position 10 to position 3 yields +7,
//! an improvement.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{RankSnapshot, TrendBaselines};

/// The three reporting windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Day,
    Week,
    Month,
}

impl Window {
    pub fn duration(self) -> Duration {
        match self {
            Window::Day => Duration::hours(24),
            Window::Week => Duration::days(7),
            Window::Month => Duration::days(30),
        }
    }
}

/// Compute the baselines to store alongside a fresh observation.
///
/// With no prior snapshot every window starts empty with its clock set to
/// `now`. With a prior snapshot, each window rolls independently: it
/// adopts the prior rank as baseline once its duration has elapsed (a
/// missing roll timestamp counts as elapsed), and a prior rank of 0 —
/// "not found" — rolls to no-data rather than becoming a fake position.
pub fn roll_baselines(prior: Option<&RankSnapshot>, now: DateTime<Utc>) -> TrendBaselines {
    let Some(prior) = prior else {
        return TrendBaselines {
            rank_24h: None,
            rank_7d: None,
            rank_30d: None,
            rolled_24h_at: Some(now),
            rolled_7d_at: Some(now),
            rolled_30d_at: Some(now),
        };
    };

    let stored = &prior.baselines;
    let (rank_24h, rolled_24h_at) = roll_window(
        stored.rank_24h,
        stored.rolled_24h_at,
        prior.rank,
        Window::Day,
        now,
    );
    let (rank_7d, rolled_7d_at) = roll_window(
        stored.rank_7d,
        stored.rolled_7d_at,
        prior.rank,
        Window::Week,
        now,
    );
    let (rank_30d, rolled_30d_at) = roll_window(
        stored.rank_30d,
        stored.rolled_30d_at,
        prior.rank,
        Window::Month,
        now,
    );

    TrendBaselines {
        rank_24h,
        rank_7d,
        rank_30d,
        rolled_24h_at,
        rolled_7d_at,
        rolled_30d_at,
    }
}

fn roll_window(
    stored: Option<i64>,
    rolled_at: Option<DateTime<Utc>>,
    prior_rank: i64,
    window: Window,
    now: DateTime<Utc>,
) -> (Option<i64>, Option<DateTime<Utc>>) {
    let elapsed = match rolled_at {
        Some(rolled_at) => now.signed_duration_since(rolled_at) >= window.duration(),
        None => true,
    };
    if elapsed {
        ((prior_rank > 0).then_some(prior_rank), Some(now))
    } else {
        (stored, rolled_at)
    }
}

/// Direction of a rank movement relative to a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Improved,
    Worsened,
    Unchanged,
    NoData,
}

/// Displayable trend for one window. Derived at read time, never persisted.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Trend {
    pub baseline: Option<i64>,
    pub delta: Option<i64>,
    pub direction: Direction,
}

impl Trend {
    pub fn symbol(&self) -> &'static str {
        match self.direction {
            Direction::Improved => "▲",
            Direction::Worsened => "▼",
            Direction::Unchanged => "●",
            Direction::NoData => "—",
        }
    }
}

/// Derive the directional delta for display.
///
/// Requires a real position on both sides: a current or baseline rank of 0
/// ("not found") yields no data instead of a nonsense delta.
pub fn derive(current_rank: i64, baseline: Option<i64>) -> Trend {
    match baseline {
        Some(baseline) if baseline > 0 && current_rank > 0 => {
            let delta = baseline - current_rank;
            let direction = match delta {
                d if d > 0 => Direction::Improved,
                d if d < 0 => Direction::Worsened,
                _ => Direction::Unchanged,
            };
            Trend {
                baseline: Some(baseline),
                delta: Some(delta),
                direction,
            }
        }
        _ => Trend {
            baseline: None,
            delta: None,
            direction: Direction::NoData,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Device, SearchEngine};

    fn snapshot(rank: i64, baselines: TrendBaselines, observed_at: DateTime<Utc>) -> RankSnapshot {
        RankSnapshot {
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            keyword: "pizza".to_string(),
            domain: "joes-pizza.com".to_string(),
            device: Device::Desktop,
            engine: SearchEngine::Google,
            location: None,
            rank,
            matched_identity: "joes-pizza.com".to_string(),
            rating: None,
            reviews: None,
            baselines,
            first_seen_at: observed_at,
            observed_at,
        }
    }

    fn ts(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    #[test]
    fn first_observation_starts_all_windows_empty() {
        let now = ts("2026-08-01T12:00:00Z");
        let baselines = roll_baselines(None, now);
        assert_eq!(baselines.rank_7d, None);
        assert_eq!(baselines.rolled_24h_at, Some(now));
        assert_eq!(baselines.rolled_7d_at, Some(now));
        assert_eq!(baselines.rolled_30d_at, Some(now));
    }

    #[test]
    fn window_rolls_just_past_its_duration() {
        let rolled = ts("2026-07-25T11:59:59Z");
        let now = ts("2026-08-01T12:00:00Z"); // 7d and 1s later
        let prior = snapshot(
            5,
            TrendBaselines {
                rank_7d: Some(9),
                rolled_7d_at: Some(rolled),
                ..TrendBaselines::default()
            },
            rolled,
        );
        let baselines = roll_baselines(Some(&prior), now);
        assert_eq!(baselines.rank_7d, Some(5));
        assert_eq!(baselines.rolled_7d_at, Some(now));
    }

    #[test]
    fn window_holds_just_short_of_its_duration() {
        let rolled = ts("2026-07-25T12:01:00Z");
        let now = ts("2026-08-01T12:00:00Z"); // 6d 23h 59m later
        let prior = snapshot(
            5,
            TrendBaselines {
                rank_7d: Some(9),
                rolled_7d_at: Some(rolled),
                ..TrendBaselines::default()
            },
            rolled,
        );
        let baselines = roll_baselines(Some(&prior), now);
        assert_eq!(baselines.rank_7d, Some(9));
        assert_eq!(baselines.rolled_7d_at, Some(rolled));
    }

    #[test]
    fn windows_roll_independently() {
        let day_ago = ts("2026-07-31T11:00:00Z");
        let now = ts("2026-08-01T12:00:00Z");
        let prior = snapshot(
            3,
            TrendBaselines {
                rank_24h: Some(8),
                rank_7d: Some(12),
                rank_30d: Some(20),
                rolled_24h_at: Some(day_ago),
                rolled_7d_at: Some(day_ago),
                rolled_30d_at: Some(day_ago),
            },
            day_ago,
        );
        let baselines = roll_baselines(Some(&prior), now);
        // 25h elapsed: only the 24h window moves.
        assert_eq!(baselines.rank_24h, Some(3));
        assert_eq!(baselines.rank_7d, Some(12));
        assert_eq!(baselines.rank_30d, Some(20));
    }

    #[test]
    fn missing_roll_timestamp_rolls_immediately() {
        let now = ts("2026-08-01T12:00:00Z");
        let prior = snapshot(7, TrendBaselines::default(), now);
        let baselines = roll_baselines(Some(&prior), now);
        assert_eq!(baselines.rank_24h, Some(7));
        assert_eq!(baselines.rank_30d, Some(7));
    }

    #[test]
    fn not_found_prior_rolls_to_no_data() {
        let long_ago = ts("2026-06-01T00:00:00Z");
        let now = ts("2026-08-01T12:00:00Z");
        let prior = snapshot(
            0,
            TrendBaselines {
                rank_7d: Some(4),
                rolled_7d_at: Some(long_ago),
                ..TrendBaselines::default()
            },
            long_ago,
        );
        let baselines = roll_baselines(Some(&prior), now);
        assert_eq!(baselines.rank_7d, None);
        assert_eq!(baselines.rolled_7d_at, Some(now));
    }

    #[test]
    fn sign_convention_lower_is_better() {
        let trend = derive(3, Some(10));
        assert_eq!(trend.delta, Some(7));
        assert_eq!(trend.direction, Direction::Improved);

        let trend = derive(10, Some(3));
        assert_eq!(trend.delta, Some(-7));
        assert_eq!(trend.direction, Direction::Worsened);

        let trend = derive(4, Some(4));
        assert_eq!(trend.delta, Some(0));
        assert_eq!(trend.direction, Direction::Unchanged);
    }

    #[test]
    fn missing_positions_yield_no_data() {
        assert_eq!(derive(5, None).direction, Direction::NoData);
        assert_eq!(derive(0, Some(5)).direction, Direction::NoData);
        assert_eq!(derive(5, Some(0)).direction, Direction::NoData);
    }
}
