//! Game configuration with validation and defaults
//!
//! One source of truth for house edge, stake bounds and game-specific
//! parameters. Read-only to the engine during play; mutated only through an
//! administrative path outside this crate.

use crate::games::types::SlotSymbol;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Complete engine configuration, one section per game.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dice: DiceConfig,
    pub slots: SlotsConfig,
    pub crash: CrashConfig,
}

/// Dice game parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceConfig {
    /// Fraction of expected return retained by the house, strictly in (0, 1).
    pub house_edge: f64,
    pub min_bet: f64,
    pub max_bet: f64,
}

impl Default for DiceConfig {
    fn default() -> Self {
        Self {
            house_edge: 0.01,
            min_bet: 1.0,
            max_bet: 1_000.0,
        }
    }
}

/// Slots game parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotsConfig {
    pub min_bet: f64,
    pub max_bet: f64,
    /// Per-symbol line multiplier. A winning line pays stake times the
    /// multiplier of its symbol. The house edge of the slots game is implied
    /// by this table; see [`SlotsConfig::expected_return`].
    pub symbol_multipliers: HashMap<SlotSymbol, f64>,
}

impl Default for SlotsConfig {
    fn default() -> Self {
        // Tuned so the 8-line game returns about 96% of stakes.
        let symbol_multipliers = HashMap::from([
            (SlotSymbol::Crown, 10.0),
            (SlotSymbol::Star, 7.0),
            (SlotSymbol::Diamond, 4.0),
            (SlotSymbol::Heart, 2.5),
            (SlotSymbol::Club, 1.5),
            (SlotSymbol::Clover, 1.0),
        ]);
        Self {
            min_bet: 1.0,
            max_bet: 1_000.0,
            symbol_multipliers,
        }
    }
}

impl SlotsConfig {
    /// Expected fraction of the stake returned per spin.
    ///
    /// A payline lands on any given symbol with probability 1/n^3 for n
    /// uniform symbols, so the expectation over all lines and symbols is
    /// lines * sum(multipliers) / n^3.
    pub fn expected_return(&self) -> f64 {
        let n = SlotSymbol::ALL.len() as f64;
        let line_count = crate::games::payout::PAYLINES.len() as f64;
        let multiplier_sum: f64 = self.symbol_multipliers.values().sum();
        line_count * multiplier_sum / (n * n * n)
    }
}

/// Crash game parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub house_edge: f64,
    pub min_bet: f64,
    pub max_bet: f64,
    /// Hard cap on the crash point; also where a zero entropy draw lands.
    pub max_multiplier: f64,
    /// Exponent rate of the multiplier curve, e^(rate * seconds).
    pub growth_rate: f64,
    pub tick_interval_ms: u64,
    pub betting_window_ms: u64,
    /// Pause between a crash and the next round opening for bets.
    pub intermission_ms: u64,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            house_edge: 0.01,
            min_bet: 1.0,
            max_bet: 1_000.0,
            max_multiplier: 100.0,
            growth_rate: 0.1,
            tick_interval_ms: 50,
            betting_window_ms: 5_000,
            intermission_ms: 3_000,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    #[error("failed to load configuration: {0}")]
    LoadFailed(String),
}

impl EngineConfig {
    /// Load configuration from a TOML file. Sections and fields omitted from
    /// the file fall back to their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed(e.to_string()))
    }

    /// Validate configuration for logical consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_house_edge("dice.house_edge", self.dice.house_edge)?;
        validate_stake_bounds("dice", self.dice.min_bet, self.dice.max_bet)?;

        validate_stake_bounds("slots", self.slots.min_bet, self.slots.max_bet)?;
        if self.slots.symbol_multipliers.is_empty() {
            return Err(ConfigError::MissingRequired(
                "slots.symbol_multipliers must not be empty".to_string(),
            ));
        }
        for symbol in SlotSymbol::ALL {
            match self.slots.symbol_multipliers.get(&symbol) {
                None => {
                    return Err(ConfigError::MissingRequired(format!(
                        "slots.symbol_multipliers is missing symbol '{}'",
                        symbol
                    )))
                }
                Some(m) if !m.is_finite() || *m <= 0.0 => {
                    return Err(ConfigError::InvalidValue(format!(
                        "slots multiplier for '{}' must be a positive number",
                        symbol
                    )))
                }
                Some(_) => {}
            }
        }

        validate_house_edge("crash.house_edge", self.crash.house_edge)?;
        validate_stake_bounds("crash", self.crash.min_bet, self.crash.max_bet)?;
        if !self.crash.max_multiplier.is_finite() || self.crash.max_multiplier <= 1.0 {
            return Err(ConfigError::InvalidValue(
                "crash.max_multiplier must be greater than 1".to_string(),
            ));
        }
        if !self.crash.growth_rate.is_finite() || self.crash.growth_rate <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "crash.growth_rate must be positive".to_string(),
            ));
        }
        if self.crash.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "crash.tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.crash.betting_window_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "crash.betting_window_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_house_edge(field: &str, edge: f64) -> Result<(), ConfigError> {
    if !edge.is_finite() || edge <= 0.0 || edge >= 1.0 {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be strictly between 0 and 1, got {}",
            field, edge
        )));
    }
    Ok(())
}

fn validate_stake_bounds(game: &str, min_bet: f64, max_bet: f64) -> Result<(), ConfigError> {
    if !min_bet.is_finite() || min_bet <= 0.0 {
        return Err(ConfigError::InvalidValue(format!(
            "{}.min_bet must be positive, got {}",
            game, min_bet
        )));
    }
    if !max_bet.is_finite() || max_bet < min_bet {
        return Err(ConfigError::InvalidValue(format!(
            "{}.max_bet ({}) must be at least min_bet ({})",
            game, max_bet, min_bet
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_slots_table_returns_under_one() {
        let slots = SlotsConfig::default();
        let rtp = slots.expected_return();
        assert!(rtp > 0.90 && rtp < 1.0, "unexpected slots RTP {}", rtp);
    }

    #[test]
    fn house_edge_bounds_are_exclusive() {
        let mut config = EngineConfig::default();
        config.dice.house_edge = 0.0;
        assert!(config.validate().is_err());

        config.dice.house_edge = 1.0;
        assert!(config.validate().is_err());

        config.dice.house_edge = 0.05;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn inverted_bet_bounds_rejected() {
        let mut config = EngineConfig::default();
        config.crash.min_bet = 100.0;
        config.crash.max_bet = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_slot_table_rejected() {
        let mut config = EngineConfig::default();
        config.slots.symbol_multipliers.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            [dice]
            house_edge = 0.02
            "#,
        )
        .unwrap();
        assert_eq!(parsed.dice.house_edge, 0.02);
        assert_eq!(parsed.dice.max_bet, 1_000.0);
        assert_eq!(parsed.crash.max_multiplier, 100.0);
        assert!(parsed.validate().is_ok());
    }
}
