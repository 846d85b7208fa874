//! Payout computation
//!
//! Pure, deterministic functions mapping outcome + stake + configuration to a
//! payout amount. No entropy, no I/O; everything here is safe to call from
//! the settlement hot path and from verification tooling.

use crate::config::{DiceConfig, SlotsConfig};
use crate::errors::RejectReason;
use crate::games::types::{Direction, SlotGrid, WinningLine};

/// The eight paylines of the 3x3 grid: three rows, three columns and both
/// diagonals, as (row, column) cell coordinates.
pub const PAYLINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// Reject stakes outside the configured bounds before any entropy is
/// consumed or any balance is touched.
pub fn validate_stake(stake: f64, min_bet: f64, max_bet: f64) -> Result<(), RejectReason> {
    if !stake.is_finite() || stake < min_bet || stake > max_bet {
        return Err(RejectReason::StakeOutOfRange {
            stake,
            min: min_bet,
            max: max_bet,
        });
    }
    Ok(())
}

/// Dice targets must leave room to win on both sides of the roll range.
pub fn validate_dice_target(target: u8) -> Result<(), RejectReason> {
    if !(1..=99).contains(&target) {
        return Err(RejectReason::InvalidTarget(target));
    }
    Ok(())
}

/// Win probability for a roll in `[1, 100]` against the chosen target.
pub fn dice_win_probability(target: u8, direction: Direction) -> f64 {
    match direction {
        Direction::Over => f64::from(100 - target) / 100.0,
        Direction::Under => f64::from(target) / 100.0,
    }
}

/// Payout multiplier `(1 - houseEdge) / p`.
///
/// This exact formula bakes the configured house edge into every bet
/// regardless of the chosen target; expected return is
/// `multiplier * p = 1 - houseEdge` for all targets and directions.
pub fn dice_multiplier(house_edge: f64, target: u8, direction: Direction) -> f64 {
    (1.0 - house_edge) / dice_win_probability(target, direction)
}

pub fn dice_wins(roll: u8, target: u8, direction: Direction) -> bool {
    match direction {
        Direction::Over => roll > target,
        Direction::Under => roll < target,
    }
}

pub fn dice_payout(
    config: &DiceConfig,
    stake: f64,
    target: u8,
    direction: Direction,
    roll: u8,
) -> f64 {
    if dice_wins(roll, target, direction) {
        stake * dice_multiplier(config.house_edge, target, direction)
    } else {
        0.0
    }
}

/// Every payline whose three cells share a symbol.
pub fn slots_winning_lines(grid: &SlotGrid) -> Vec<WinningLine> {
    PAYLINES
        .iter()
        .filter_map(|line| {
            let [a, b, c] = *line;
            let symbol = grid[a.0][a.1];
            if grid[b.0][b.1] == symbol && grid[c.0][c.1] == symbol {
                Some(WinningLine {
                    positions: [a.0 * 3 + a.1, b.0 * 3 + b.1, c.0 * 3 + c.1],
                    symbol,
                })
            } else {
                None
            }
        })
        .collect()
}

/// Total payout over all winning lines; each line pays stake times its
/// symbol's multiplier.
pub fn slots_payout(config: &SlotsConfig, stake: f64, winning_lines: &[WinningLine]) -> f64 {
    winning_lines
        .iter()
        .map(|line| {
            let multiplier = config
                .symbol_multipliers
                .get(&line.symbol)
                .copied()
                .unwrap_or(0.0);
            stake * multiplier
        })
        .sum()
}

/// Crash pays stake times the multiplier the bet cashed out at; a bet still
/// standing when the round crashes pays nothing.
pub fn crash_payout(stake: f64, cashout_multiplier: f64) -> f64 {
    stake * cashout_multiplier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::SlotSymbol;

    #[test]
    fn dice_multiplier_preserves_house_edge_for_all_targets() {
        let house_edge = 0.01;
        for target in 1..=99u8 {
            for direction in [Direction::Over, Direction::Under] {
                let p = dice_win_probability(target, direction);
                let multiplier = dice_multiplier(house_edge, target, direction);
                assert!(
                    (multiplier * p - (1.0 - house_edge)).abs() < 1e-9,
                    "target {} {}: multiplier {} * p {} != {}",
                    target,
                    direction,
                    multiplier,
                    p,
                    1.0 - house_edge
                );
            }
        }
    }

    #[test]
    fn dice_scenario_target_50_over() {
        let config = DiceConfig::default();
        // p = 0.5, multiplier = 1.98
        let multiplier = dice_multiplier(config.house_edge, 50, Direction::Over);
        assert!((multiplier - 1.98).abs() < 1e-9);

        let win = dice_payout(&config, 10.0, 50, Direction::Over, 76);
        assert!((win - 19.8).abs() < 1e-9);

        let loss = dice_payout(&config, 10.0, 50, Direction::Over, 30);
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn dice_roll_equal_to_target_loses_both_directions() {
        assert!(!dice_wins(50, 50, Direction::Over));
        assert!(!dice_wins(50, 50, Direction::Under));
    }

    #[test]
    fn dice_target_bounds() {
        assert!(validate_dice_target(0).is_err());
        assert!(validate_dice_target(100).is_err());
        assert!(validate_dice_target(1).is_ok());
        assert!(validate_dice_target(99).is_ok());
    }

    #[test]
    fn stake_bounds_are_inclusive() {
        assert!(validate_stake(1.0, 1.0, 1_000.0).is_ok());
        assert!(validate_stake(1_000.0, 1.0, 1_000.0).is_ok());
        assert!(validate_stake(0.99, 1.0, 1_000.0).is_err());
        assert!(validate_stake(1_000.01, 1.0, 1_000.0).is_err());
        assert!(validate_stake(f64::NAN, 1.0, 1_000.0).is_err());
    }

    fn uniform_grid(symbol: SlotSymbol) -> SlotGrid {
        [[symbol; 3]; 3]
    }

    #[test]
    fn slots_all_same_symbol_wins_every_line() {
        let lines = slots_winning_lines(&uniform_grid(SlotSymbol::Crown));
        assert_eq!(lines.len(), PAYLINES.len());
        assert!(lines.iter().all(|l| l.symbol == SlotSymbol::Crown));
    }

    #[test]
    fn slots_detects_single_row() {
        use SlotSymbol::{Club, Clover, Crown, Diamond, Heart, Star};
        let grid: SlotGrid = [
            [Crown, Crown, Crown],
            [Star, Diamond, Heart],
            [Club, Clover, Star],
        ];
        let lines = slots_winning_lines(&grid);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].positions, [0, 1, 2]);
        assert_eq!(lines[0].symbol, Crown);
    }

    #[test]
    fn slots_detects_diagonal() {
        use SlotSymbol::{Club, Clover, Diamond, Heart, Star};
        let grid: SlotGrid = [
            [Star, Club, Diamond],
            [Clover, Star, Heart],
            [Diamond, Heart, Star],
        ];
        let lines = slots_winning_lines(&grid);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].positions, [0, 4, 8]);
    }

    #[test]
    fn slots_payout_sums_winning_lines() {
        let config = SlotsConfig::default();
        let lines = slots_winning_lines(&uniform_grid(SlotSymbol::Clover));
        let payout = slots_payout(&config, 2.0, &lines);
        // 8 lines of clover at 1.0x on a 2.0 stake
        assert!((payout - 16.0).abs() < 1e-9);
    }

    #[test]
    fn crash_scenario_auto_cashout() {
        // stake 5 cashed out at 2.0 pays 10.0
        assert!((crash_payout(5.0, 2.0) - 10.0).abs() < 1e-9);
    }
}
