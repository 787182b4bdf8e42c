//! Activity scoring
//!
//! Maps a [`FrequencyStats`] snapshot to a score in `[0, 1]` used to rank
//! which channels are busy.

use crate::model::{FrequencyStats, RSSI_CEILING_DBM, RSSI_FLOOR_DBM};

const RSSI_WEIGHT: f64 = 0.35;
const PACKET_WEIGHT: f64 = 0.30;
const STABILITY_WEIGHT: f64 = 0.20;
const FRESHNESS_WEIGHT: f64 = 0.15;

/// RSSI spread (dB) at which stability bottoms out
const MAX_RSSI_SPREAD_DB: f64 = 30.0;

/// Silence after which freshness reaches zero
pub const FRESHNESS_HORIZON_MS: u64 = 5 * 60 * 1000;

/// Linear map of `value` from `[min, max]` onto `[0, 1]`, clamped
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max <= min {
        return 0.0;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Fixed-weight activity scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityScorer;

impl ActivityScorer {
    /// Score one frequency as of `now_ms`
    pub fn score(stats: &FrequencyStats, now_ms: u64) -> f64 {
        if stats.sample_count == 0 {
            return 0.0;
        }

        let rssi_score = normalize(
            stats.avg_rssi as f64,
            RSSI_FLOOR_DBM as f64,
            RSSI_CEILING_DBM as f64,
        );

        let packet_score = (stats.packet_count as f64 / stats.sample_count as f64).min(1.0);

        let spread = (stats.max_rssi as f64 - stats.min_rssi as f64).abs();
        let stability_score = 1.0 - normalize(spread, 0.0, MAX_RSSI_SPREAD_DB);

        let age = now_ms.saturating_sub(stats.last_seen) as f64;
        let freshness_score = (1.0 - age / FRESHNESS_HORIZON_MS as f64).max(0.0);

        let score = RSSI_WEIGHT * rssi_score
            + PACKET_WEIGHT * packet_score
            + STABILITY_WEIGHT * stability_score
            + FRESHNESS_WEIGHT * freshness_score;

        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(avg: i16, max: i16, min: i16, samples: u32, packets: u32, last_seen: u64) -> FrequencyStats {
        FrequencyStats {
            avg_rssi: avg,
            max_rssi: max,
            min_rssi: min,
            sample_count: samples,
            packet_count: packets,
            last_seen,
            ..FrequencyStats::new(433_000_000)
        }
    }

    #[test]
    fn unsampled_frequency_scores_zero() {
        let fresh = FrequencyStats::new(433_000_000);
        assert_eq!(ActivityScorer::score(&fresh, 0), 0.0);

        let loud = stats(-50, -50, -50, 0, 10, 100);
        assert_eq!(ActivityScorer::score(&loud, 100), 0.0);
    }

    #[test]
    fn best_case_scores_one() {
        let s = stats(-50, -50, -50, 10, 10, 1_000);
        assert!((ActivityScorer::score(&s, 1_000) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weak_quiet_stale_channel_scores_low() {
        // Only the stability term survives
        let s = stats(-120, -120, -120, 10, 0, 0);
        let score = ActivityScorer::score(&s, FRESHNESS_HORIZON_MS * 2);
        assert!((score - STABILITY_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn score_stays_in_unit_range() {
        for avg in [-200i16, -120, -85, -50, 0, 30] {
            for spread in [0i16, 10, 30, 90] {
                for (samples, packets) in [(1u32, 0u32), (1, 5), (10, 3), (u32::MAX, u32::MAX)] {
                    for now in [0u64, 60_000, 10 * FRESHNESS_HORIZON_MS] {
                        let s = stats(avg, avg, avg.saturating_sub(spread), samples, packets, 30_000);
                        let score = ActivityScorer::score(&s, now);
                        assert!((0.0..=1.0).contains(&score), "score {score} out of range");
                    }
                }
            }
        }
    }

    #[test]
    fn freshness_decays_with_age() {
        let s = stats(-80, -75, -85, 10, 2, 0);
        let recent = ActivityScorer::score(&s, 1_000);
        let older = ActivityScorer::score(&s, 120_000);
        let stale = ActivityScorer::score(&s, FRESHNESS_HORIZON_MS);
        assert!(recent > older);
        assert!(older > stale);
    }

    #[test]
    fn normalize_clamps() {
        assert_eq!(normalize(-130.0, -120.0, -50.0), 0.0);
        assert_eq!(normalize(-40.0, -120.0, -50.0), 1.0);
        assert!((normalize(-85.0, -120.0, -50.0) - 0.5).abs() < 1e-9);
        assert_eq!(normalize(5.0, 1.0, 1.0), 0.0);
    }
}
