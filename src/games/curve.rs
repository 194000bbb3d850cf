//! Pure multiplier curves shared by the server and any client-side preview.
//!
//! Every function here is deterministic: the same inputs always give the
//! same multiplier on the two-decimal grid.

use crate::games::types::Multiplier;

/// Round length at a 1.00x outcome
pub const CRASH_BASE_DURATION_MS: u64 = 3_000;

/// Upper bound on any round length
pub const CRASH_MAX_DURATION_MS: u64 = 20_000;

/// Exponent of the easing curve; above 1 so growth starts slow and accelerates
pub const CRASH_EASING_EXPONENT: f64 = 1.5;

/// House edge applied to mines payouts, in basis points
pub const MINES_HOUSE_EDGE_BPS: u64 = 100;

/// Standard 5x5 grid
pub const MINES_TOTAL_CELLS: u8 = 25;

/// Length of a round that crashes at `outcome`.
///
/// Grows logarithmically with the outcome so high multipliers take longer
/// to reach, but stays bounded by [`CRASH_MAX_DURATION_MS`].
pub fn crash_duration_ms(outcome: Multiplier) -> u64 {
    let scale = (outcome.as_f64().max(1.0) + 1.0).log2();
    let duration = (CRASH_BASE_DURATION_MS as f64 * scale).round() as u64;
    duration.min(CRASH_MAX_DURATION_MS)
}

/// Live multiplier `elapsed_ms` into a round lasting `total_ms`.
///
/// Reaches `outcome` exactly when `elapsed_ms >= total_ms`.
pub fn crash_multiplier_at(elapsed_ms: u64, total_ms: u64, outcome: Multiplier) -> Multiplier {
    if total_ms == 0 || elapsed_ms >= total_ms {
        return outcome;
    }
    if outcome <= Multiplier::ONE {
        return Multiplier::ONE;
    }

    let ratio = elapsed_ms as f64 / total_ms as f64;
    let eased = ratio.clamp(0.0, 1.0).powf(CRASH_EASING_EXPONENT);
    let gain = outcome.hundredths() - Multiplier::ONE.hundredths();
    let step = (gain as f64 * eased).floor() as u64;

    Multiplier::from_hundredths(Multiplier::ONE.hundredths() + step.min(gain))
}

/// Multiplier after `revealed_count` safe reveals with `mine_count` mines.
///
/// The fair odds of surviving `k` reveals are `Π (N-i)/(N-m-i)` for `i < k`;
/// the payout is that product less the house edge, never below 1.00x.
pub fn mines_multiplier_at(mine_count: u8, revealed_count: u8, total_cells: u8) -> Multiplier {
    if revealed_count == 0 || mine_count == 0 || mine_count >= total_cells {
        return Multiplier::ONE;
    }

    let total = total_cells as f64;
    let safe = (total_cells - mine_count) as f64;
    let revealed = revealed_count.min(total_cells - mine_count);

    let mut fair = 1.0_f64;
    for i in 0..revealed {
        let i = i as f64;
        fair *= (total - i) / (safe - i);
    }

    let edge = 1.0 - MINES_HOUSE_EDGE_BPS as f64 / 10_000.0;
    Multiplier::from_f64_floor(fair * edge).max(Multiplier::ONE)
}

/// Multiplier the next safe reveal would pay, if any safe cell remains
pub fn next_mines_multiplier(mine_count: u8, revealed_count: u8, total_cells: u8) -> Option<Multiplier> {
    if revealed_count >= total_cells.saturating_sub(mine_count) {
        return None;
    }
    Some(mines_multiplier_at(mine_count, revealed_count + 1, total_cells))
}

/// Chance that the next reveal hits a mine, given `revealed_count` safe cells so far
pub fn mine_probability(mine_count: u8, revealed_count: u8, total_cells: u8) -> f64 {
    let remaining = total_cells.saturating_sub(revealed_count);
    if remaining == 0 {
        return 0.0;
    }
    mine_count as f64 / remaining as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_grows_with_outcome_and_is_bounded() {
        assert_eq!(crash_duration_ms(Multiplier::ONE), 3_000);

        let mut last = 0;
        for h in (100..=5_000).step_by(25) {
            let d = crash_duration_ms(Multiplier::from_hundredths(h));
            assert!(d >= last);
            assert!(d <= CRASH_MAX_DURATION_MS);
            last = d;
        }
        assert_eq!(crash_duration_ms(Multiplier::from_hundredths(1_000_000)), CRASH_MAX_DURATION_MS);
    }

    #[test]
    fn test_crash_curve_hits_outcome_at_end() {
        for h in [100, 101, 150, 350, 1234, 5000] {
            let outcome = Multiplier::from_hundredths(h);
            let total = crash_duration_ms(outcome);
            assert_eq!(crash_multiplier_at(total, total, outcome), outcome);
            assert_eq!(crash_multiplier_at(total + 5_000, total, outcome), outcome);
        }
    }

    #[test]
    fn test_crash_curve_is_monotone_and_bounded() {
        let outcome = Multiplier::from_hundredths(350);
        let total = crash_duration_ms(outcome);

        assert_eq!(crash_multiplier_at(0, total, outcome), Multiplier::ONE);

        let mut last = Multiplier::ONE;
        for elapsed in (0..=total).step_by(50) {
            let m = crash_multiplier_at(elapsed, total, outcome);
            assert!(m >= last);
            assert!(m <= outcome);
            last = m;
        }
    }

    #[test]
    fn test_crash_curve_starts_slow() {
        let outcome = Multiplier::from_hundredths(1_100);
        let total = 10_000;

        // Easing keeps the halfway multiplier well under the linear midpoint
        let halfway = crash_multiplier_at(5_000, total, outcome);
        assert!(halfway < Multiplier::from_hundredths(600), "halfway {}", halfway);
    }

    #[test]
    fn test_mines_multiplier_strictly_increasing_in_reveals() {
        for mines in 1..=24u8 {
            let mut last = mines_multiplier_at(mines, 0, MINES_TOTAL_CELLS);
            assert_eq!(last, Multiplier::ONE);

            for revealed in 1..=(MINES_TOTAL_CELLS - mines) {
                let m = mines_multiplier_at(mines, revealed, MINES_TOTAL_CELLS);
                assert!(m > last, "mines={} revealed={} {} <= {}", mines, revealed, m, last);
                last = m;
            }
        }
    }

    #[test]
    fn test_mines_multiplier_increasing_in_mine_count() {
        for revealed in 1..=5u8 {
            let mut last = Multiplier::ONE;
            for mines in 1..=(MINES_TOTAL_CELLS - revealed) {
                let m = mines_multiplier_at(mines, revealed, MINES_TOTAL_CELLS);
                assert!(m > last, "mines={} revealed={}", mines, revealed);
                last = m;
            }
        }
    }

    #[test]
    fn test_mines_multiplier_known_values() {
        // 25/24 * 0.99 = 1.03125
        assert_eq!(mines_multiplier_at(1, 1, 25), Multiplier::from_hundredths(103));
        // 25 * 0.99
        assert_eq!(mines_multiplier_at(24, 1, 25), Multiplier::from_hundredths(2_475));
        assert_eq!(
            next_mines_multiplier(3, 0, 25),
            Some(mines_multiplier_at(3, 1, 25))
        );
        assert_eq!(next_mines_multiplier(24, 1, 25), None);
    }

    #[test]
    fn test_mine_probability() {
        assert!((mine_probability(5, 0, 25) - 0.2).abs() < f64::EPSILON);
        assert!((mine_probability(5, 15, 25) - 0.5).abs() < f64::EPSILON);
    }
}
