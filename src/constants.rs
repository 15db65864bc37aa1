/// Constants used by the violation sampling engine.
pub mod sampler {
    use crate::types::QueryKind;

    /// Query-kind tag for inequality violation queries.
    pub const INEQUALITY_QUERY_TYPE: QueryKind = "inequality";
    /// Seed used when a run does not configure one.
    pub const DEFAULT_SEED: u64 = 42;
    /// Offset mixed into the per-query RNG seed derivation.
    pub const QUERY_SEED_OFFSET: u64 = 0x51A_7E5D;
}

/// Constants used by the built-in strategies.
pub mod strategies {
    /// Default ratio between the per-side row cap and the quota.
    pub const DEFAULT_LIMIT_FACTOR: f64 = 2.0;
    /// Default string appended by the typo strategy.
    pub const DEFAULT_TYPO_CHARS: &str = "*";
    /// Default number of times the typo string is appended.
    pub const DEFAULT_TYPO_REPEAT: usize = 2;
    /// Default alphabet for randomized typos.
    pub const DEFAULT_TYPO_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";
}

/// Constants used by the flat-file export.
pub mod export {
    /// Field separator between cell id, new value, and original value.
    pub const CSV_SEPARATOR: &str = ",";
    /// Separator between tuple oid and attribute name in the cell id.
    pub const CELL_ID_DELIMITER: &str = ".";
}
