//! Random outcome generation
//!
//! All game entropy comes from the operating system's secure random source
//! via [`OsRng`]. There is deliberately no fallback: if the platform cannot
//! supply secure entropy, every draw fails with a fatal internal error rather
//! than degrading to a predictable generator.

use crate::errors::EngineError;
use crate::games::types::{SlotGrid, SlotSymbol};
use rand::rngs::OsRng;
use rand::RngCore;

/// Width of the entropy word used for integer draws.
const ENTROPY_WORD: u64 = 1 << 32;

/// Draws unbiased, unpredictable outcomes for every game.
#[derive(Debug, Default)]
pub struct OutcomeGenerator;

impl OutcomeGenerator {
    pub fn new() -> Self {
        Self
    }

    fn entropy_word(&self) -> Result<u32, EngineError> {
        let mut buf = [0u8; 4];
        OsRng.try_fill_bytes(&mut buf).map_err(|e| {
            EngineError::internal(format!("secure entropy source unavailable: {}", e))
        })?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Inclusive uniform integer draw over `[min, max]`.
    ///
    /// Rejection sampling over the 32-bit entropy word: draws at or above the
    /// largest multiple of the range width are discarded, so every value in
    /// range is exactly equally likely.
    pub fn uniform(&self, min: u32, max: u32) -> Result<u32, EngineError> {
        debug_assert!(min <= max);
        let range = u64::from(max - min) + 1;
        let limit = ENTROPY_WORD - (ENTROPY_WORD % range);
        loop {
            let draw = u64::from(self.entropy_word()?);
            if draw < limit {
                return Ok(min + (draw % range) as u32);
            }
        }
    }

    /// Dice roll in `[1, 100]`.
    pub fn dice_roll(&self) -> Result<u8, EngineError> {
        Ok(self.uniform(1, 100)? as u8)
    }

    /// Crash point for one round, in `[1.0, max_multiplier]` with cent
    /// precision.
    ///
    /// A single 32-bit draw `u` is mapped through
    /// `floor(100 * (1 - edge) * 2^32 / (u + 1)) / 100`, which gives
    /// `P(crash_point >= m) ~= (1 - edge) / m` and therefore a fixed expected
    /// return regardless of the player's cash-out strategy. The `u + 1`
    /// denominator keeps the zero draw finite; the clamp then lands it on the
    /// configured maximum multiplier instead of a huge outlier.
    pub fn crash_point(&self, house_edge: f64, max_multiplier: f64) -> Result<f64, EngineError> {
        let draw = self.entropy_word()? as f64;
        let raw = (1.0 - house_edge) * ENTROPY_WORD as f64 / (draw + 1.0);
        let point = (raw * 100.0).floor() / 100.0;
        Ok(point.clamp(1.0, max_multiplier))
    }

    /// Fresh 3x3 grid, one independent uniform symbol draw per cell.
    pub fn slot_grid(&self) -> Result<SlotGrid, EngineError> {
        let symbol_count = SlotSymbol::ALL.len() as u32;
        let mut grid = [[SlotSymbol::Clover; 3]; 3];
        for row in grid.iter_mut() {
            for cell in row.iter_mut() {
                let index = self.uniform(0, symbol_count - 1)?;
                *cell = SlotSymbol::ALL[index as usize];
            }
        }
        Ok(grid)
    }

    /// Random salt for the crash round commitment scheme.
    pub fn salt(&self) -> Result<[u8; 16], EngineError> {
        let mut buf = [0u8; 16];
        OsRng.try_fill_bytes(&mut buf).map_err(|e| {
            EngineError::internal(format!("secure entropy source unavailable: {}", e))
        })?;
        Ok(buf)
    }
}
