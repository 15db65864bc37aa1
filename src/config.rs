use serde::{Deserialize, Serialize};

use crate::constants::sampler::DEFAULT_SEED;
use crate::constants::strategies::{
    DEFAULT_LIMIT_FACTOR, DEFAULT_TYPO_ALPHABET, DEFAULT_TYPO_CHARS, DEFAULT_TYPO_REPEAT,
};
use crate::errors::VioGenError;

/// Per-query sampling settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VioGenQueryConfig {
    /// Quota expressed as a percentage (0-100) of the target table size.
    pub percentage: f64,
    /// Probability (0-1) that an eligible pair is kept during the primary pass.
    pub probability_factor_for_inequality_queries: f64,
    /// Skip the leading candidate pairs reported by the sample-parameter provider.
    pub use_offset_in_inequality_queries: bool,
    /// Cap the rows materialized per side using the provider's limit.
    pub use_limit_in_inequality_queries: bool,
}

impl Default for VioGenQueryConfig {
    fn default() -> Self {
        Self {
            percentage: 5.0,
            probability_factor_for_inequality_queries: 0.25,
            use_offset_in_inequality_queries: true,
            use_limit_in_inequality_queries: true,
        }
    }
}

impl VioGenQueryConfig {
    /// Reject out-of-range percentages and probabilities.
    pub fn validate(&self) -> Result<(), VioGenError> {
        if !(0.0..=100.0).contains(&self.percentage) {
            return Err(VioGenError::Configuration(format!(
                "percentage must be within 0..=100, got {}",
                self.percentage
            )));
        }
        let probability = self.probability_factor_for_inequality_queries;
        if !(0.0..=1.0).contains(&probability) {
            return Err(VioGenError::Configuration(format!(
                "probability factor must be within 0..=1, got {probability}"
            )));
        }
        Ok(())
    }
}

/// Selects the sample-parameter provider used for offsets and limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleStrategyConfig {
    /// Always return the same parameters.
    Fixed { offset: usize, limit: usize },
    /// Advance a per-scope cursor so repeated runs sample fresh candidates.
    Cursor { limit_factor: f64 },
}

impl Default for SampleStrategyConfig {
    fn default() -> Self {
        SampleStrategyConfig::Cursor {
            limit_factor: DEFAULT_LIMIT_FACTOR,
        }
    }
}

/// Selects the value-mutation strategy applied to changed cells.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirtyStrategyConfig {
    /// Append `chars` to the original value `chars_to_add` times.
    TypoAppendString { chars: String, chars_to_add: usize },
    /// Append `chars_to_add` characters drawn from `alphabet`.
    TypoRandomChars {
        alphabet: String,
        chars_to_add: usize,
    },
}

impl Default for DirtyStrategyConfig {
    fn default() -> Self {
        DirtyStrategyConfig::TypoAppendString {
            chars: DEFAULT_TYPO_CHARS.to_string(),
            chars_to_add: DEFAULT_TYPO_REPEAT,
        }
    }
}

impl DirtyStrategyConfig {
    /// Randomized typos drawn from the lowercase ASCII alphabet.
    pub fn random_chars(chars_to_add: usize) -> Self {
        DirtyStrategyConfig::TypoRandomChars {
            alphabet: DEFAULT_TYPO_ALPHABET.to_string(),
            chars_to_add,
        }
    }
}

/// Run-wide configuration shared by every violation query of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// RNG seed that controls the keep/discard draws and randomized strategies.
    pub seed: u64,
    /// Exhaustive generation mode; the inequality sampler rejects it.
    pub generate_all_changes: bool,
    /// Promote per-query progress messages from `debug` to `info`.
    pub verbose: bool,
    /// Provider for offsets and per-side limits.
    pub sample_strategy: SampleStrategyConfig,
    /// Mutation applied to the selected cells.
    pub dirty_strategy: DirtyStrategyConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            generate_all_changes: false,
            verbose: false,
            sample_strategy: SampleStrategyConfig::default(),
            dirty_strategy: DirtyStrategyConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parse a JSON run configuration; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, VioGenError> {
        let config: RunConfig = serde_json::from_str(raw)
            .map_err(|err| VioGenError::Configuration(format!("invalid run config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject strategy settings that cannot produce usable parameters.
    pub fn validate(&self) -> Result<(), VioGenError> {
        if let SampleStrategyConfig::Cursor { limit_factor } = self.sample_strategy {
            if !(limit_factor.is_finite() && limit_factor >= 1.0) {
                return Err(VioGenError::Configuration(format!(
                    "limit factor must be a finite value >= 1, got {limit_factor}"
                )));
            }
        }
        if let DirtyStrategyConfig::TypoRandomChars { alphabet, .. } = &self.dirty_strategy {
            if alphabet.is_empty() {
                return Err(VioGenError::Configuration(
                    "random typo alphabet must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}
