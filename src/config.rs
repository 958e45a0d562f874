//! Tunable protocol constants.
//!
//! These are injected at [`crate::Hashgraph::initialise`] rather than read
//! from a file or environment — this crate has no CLI or config-loading
//! layer of its own (spec §1 Non-goals) — but the struct is `serde`-capable
//! so an embedding program can load it from whatever config format it
//! already uses.
use serde::{Deserialize, Serialize};

/// Protocol constants that must agree bit-for-bit across every node in a
/// deployment (spec §4.5, §6).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Coin-round period `C`: every `C`-th voting round randomises its
    /// votes instead of taking a majority. Must be greater than 2.
    pub coin_round_frequency: u32,
    /// Number of trailing rounds' election state to retain for the
    /// reconnect snapshot (`W` in spec §6, "persisted consensus state").
    /// Typical value is `3 * coin_round_frequency`.
    pub retained_rounds_window: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coin_round_frequency: 12,
            retained_rounds_window: 36,
        }
    }
}

impl Config {
    /// Validates that the constants are sane; called from
    /// `Hashgraph::initialise`.
    pub fn is_valid(&self) -> bool {
        self.coin_round_frequency > 2 && self.retained_rounds_window > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(Config::default().is_valid());
    }
}
