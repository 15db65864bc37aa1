use rand::RngCore;
use rand::seq::IndexedRandom;

use crate::config::DirtyStrategyConfig;
use crate::data::Value;

/// Produces the dirty value written into a selected cell.
///
/// Implementations depend only on their own parameters and the supplied RNG.
pub trait DirtyStrategy: Send + Sync {
    fn generate_new_value(&self, value: &Value, rng: &mut dyn RngCore) -> Value;
}

/// Appends `chars` to the stringified original value `chars_to_add` times.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypoAppendString {
    chars: String,
    chars_to_add: usize,
}

impl TypoAppendString {
    pub fn new(chars: impl Into<String>, chars_to_add: usize) -> Self {
        Self {
            chars: chars.into(),
            chars_to_add,
        }
    }
}

impl DirtyStrategy for TypoAppendString {
    fn generate_new_value(&self, value: &Value, _rng: &mut dyn RngCore) -> Value {
        let mut dirty = value.to_string();
        for _ in 0..self.chars_to_add {
            dirty.push_str(&self.chars);
        }
        Value::Text(dirty)
    }
}

/// Appends `chars_to_add` characters drawn uniformly from `alphabet`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypoRandomChars {
    alphabet: Vec<char>,
    chars_to_add: usize,
}

impl TypoRandomChars {
    pub fn new(alphabet: &str, chars_to_add: usize) -> Self {
        Self {
            alphabet: alphabet.chars().collect(),
            chars_to_add,
        }
    }
}

impl DirtyStrategy for TypoRandomChars {
    fn generate_new_value(&self, value: &Value, rng: &mut dyn RngCore) -> Value {
        let mut dirty = value.to_string();
        for _ in 0..self.chars_to_add {
            if let Some(ch) = self.alphabet.choose(&mut *rng) {
                dirty.push(*ch);
            }
        }
        Value::Text(dirty)
    }
}

/// Build the strategy named by a run configuration.
pub fn dirty_strategy_from_config(config: &DirtyStrategyConfig) -> Box<dyn DirtyStrategy> {
    match config {
        DirtyStrategyConfig::TypoAppendString {
            chars,
            chars_to_add,
        } => Box::new(TypoAppendString::new(chars.clone(), *chars_to_add)),
        DirtyStrategyConfig::TypoRandomChars {
            alphabet,
            chars_to_add,
        } => Box::new(TypoRandomChars::new(alphabet, *chars_to_add)),
    }
}
