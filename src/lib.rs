#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Bounded relational plans handed to the query backend.
pub mod algebra;
/// Query backends that materialize plans into tuples.
pub mod backend;
/// Change application for verified tuple pairs.
pub mod changes;
/// Run and per-query configuration types.
pub mod config;
/// Centralized constants used across the sampler, strategies, and export.
pub mod constants;
/// Values, tuples, cells, and change accumulators.
pub mod data;
/// Value-mutation strategies.
pub mod dirty;
/// Flat-file export of cell changes.
pub mod export;
/// Comparison formulas over two tuple variables.
pub mod formula;
mod hash;
/// Quota and sampling-window strategies.
pub mod heuristics;
/// Violation sampling engine.
pub mod sampler;
/// Shared type aliases.
pub mod types;

mod errors;

pub use algebra::AlgebraPlan;
pub use backend::{InMemoryDatabase, QueryRunner};
pub use changes::{ChangeApplicator, GenerateChanges};
pub use config::{DirtyStrategyConfig, RunConfig, SampleStrategyConfig, VioGenQueryConfig};
pub use data::{
    Cell, CellChange, CellChanges, TableAlias, Tuple, TuplePair, UsedTuples, Value,
};
pub use dirty::{DirtyStrategy, TypoAppendString, TypoRandomChars};
pub use errors::VioGenError;
pub use export::CellChangesCsvExporter;
pub use formula::{
    AttributeRef, ComparisonAtom, ComparisonOperator, CrossProduct, Formula, Operand,
    VioGenQuery,
};
pub use heuristics::{
    CursorSampleStrategy, FixedSampleSize, FixedSampleStrategy, PercentageSampleSize,
    SampleParameters, SampleScope, SampleSizeStrategy, SampleStrategy,
};
pub use sampler::{InequalitySampler, RunContext, VioGenReport};
pub use types::{AttributeName, DependencyId, QueryKind, TableName, TupleOid};
