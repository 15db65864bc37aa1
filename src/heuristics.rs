//! Quota and sampling-window estimation.
//!
//! `SampleSizeStrategy` turns a query into the number of changes to produce.
//! `SampleStrategy` turns a scope and a quota into the offset/limit window
//! used to bound candidate materialization.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Mutex;

use crate::algebra::AlgebraPlan;
use crate::config::{SampleStrategyConfig, VioGenQueryConfig};
use crate::data::TableAlias;
use crate::errors::VioGenError;
use crate::formula::VioGenQuery;
use crate::hash::stable_hash_with;
use crate::sampler::RunContext;
use crate::types::QueryKind;

/// Computes the quota for one violation query.
///
/// Must be deterministic for the same backing data and configuration.
pub trait SampleSizeStrategy: Send + Sync {
    fn sample_size(&self, query: &VioGenQuery, ctx: &RunContext) -> Result<usize, VioGenError>;
}

/// Quota as a percentage of the table bound to the first cross-product alias.
#[derive(Clone, Copy, Debug, Default)]
pub struct PercentageSampleSize;

impl SampleSizeStrategy for PercentageSampleSize {
    fn sample_size(&self, query: &VioGenQuery, ctx: &RunContext) -> Result<usize, VioGenError> {
        let percentage = query.config.percentage;
        if percentage <= 0.0 {
            return Ok(0);
        }
        let Some(target) = query.formula.cross_product.aliases.first() else {
            return Ok(0);
        };
        let table_size = ctx.runner.table_size(&target.table)?;
        Ok(percentage_of(table_size, percentage))
    }
}

/// Fixed quota regardless of data size.
#[derive(Clone, Copy, Debug)]
pub struct FixedSampleSize(pub usize);

impl SampleSizeStrategy for FixedSampleSize {
    fn sample_size(&self, _query: &VioGenQuery, _ctx: &RunContext) -> Result<usize, VioGenError> {
        Ok(self.0)
    }
}

/// `round(total * percentage / 100)`.
pub fn percentage_of(total: usize, percentage: f64) -> usize {
    ((total as f64) * percentage / 100.0).round().max(0.0) as usize
}

/// Offset (candidates to skip) and limit (rows to pull) for one scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleParameters {
    pub offset: usize,
    pub limit: usize,
}

/// What a sampling window is computed for.
#[derive(Clone, Copy, Debug)]
pub enum SampleScope<'a> {
    /// The whole violation query (offset over candidate pairs).
    Query(&'a VioGenQuery),
    /// One side's candidate plan (row cap for that side).
    Plan(&'a AlgebraPlan),
}

/// Sample-parameter provider.
pub trait SampleStrategy: Send + Sync {
    /// Compute the sampling window for `aliases` within `scope`.
    fn compute_parameters(
        &self,
        scope: SampleScope<'_>,
        aliases: &BTreeSet<TableAlias>,
        query_kind: QueryKind,
        sample_size: usize,
        config: &VioGenQueryConfig,
        ctx: &RunContext,
    ) -> Result<SampleParameters, VioGenError>;
}

/// Always returns the configured parameters.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedSampleStrategy {
    pub parameters: SampleParameters,
}

impl FixedSampleStrategy {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            parameters: SampleParameters { offset, limit },
        }
    }
}

impl SampleStrategy for FixedSampleStrategy {
    fn compute_parameters(
        &self,
        _scope: SampleScope<'_>,
        _aliases: &BTreeSet<TableAlias>,
        _query_kind: QueryKind,
        _sample_size: usize,
        _config: &VioGenQueryConfig,
        _ctx: &RunContext,
    ) -> Result<SampleParameters, VioGenError> {
        Ok(self.parameters)
    }
}

/// Cursor-based provider that moves the offset forward on every call.
///
/// Each (alias set, query kind) scope owns a cursor. A call returns the
/// current cursor as the offset and advances it by the quota, so independent
/// runs against the same relations start past the candidates consumed by
/// earlier ones. The cursor wraps to zero once the candidate space (product
/// of the scope's table sizes) cannot fit another quota.
#[derive(Debug)]
pub struct CursorSampleStrategy {
    limit_factor: f64,
    cursors: Mutex<HashMap<u64, usize>>,
}

impl CursorSampleStrategy {
    pub fn new(limit_factor: f64) -> Self {
        Self {
            limit_factor: limit_factor.max(1.0),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    fn scope_key(aliases: &BTreeSet<TableAlias>, query_kind: QueryKind) -> u64 {
        stable_hash_with(|hasher| {
            for alias in aliases {
                alias.hash(hasher);
            }
            query_kind.hash(hasher);
        })
    }

    fn candidate_space(aliases: &BTreeSet<TableAlias>, ctx: &RunContext) -> Result<usize, VioGenError> {
        let mut space = 1usize;
        for alias in aliases {
            space = space.saturating_mul(ctx.runner.table_size(&alias.table)?);
        }
        Ok(space)
    }
}

impl SampleStrategy for CursorSampleStrategy {
    fn compute_parameters(
        &self,
        _scope: SampleScope<'_>,
        aliases: &BTreeSet<TableAlias>,
        query_kind: QueryKind,
        sample_size: usize,
        _config: &VioGenQueryConfig,
        ctx: &RunContext,
    ) -> Result<SampleParameters, VioGenError> {
        let limit = ((sample_size as f64) * self.limit_factor).ceil() as usize;
        let limit = limit.max(sample_size);
        let space = Self::candidate_space(aliases, ctx)?;
        let key = Self::scope_key(aliases, query_kind);
        let mut cursors = self
            .cursors
            .lock()
            .map_err(|_| VioGenError::Strategy("sample cursor lock poisoned".into()))?;
        let cursor = cursors.entry(key).or_insert(0);
        if cursor.saturating_add(sample_size) > space {
            *cursor = 0;
        }
        let offset = *cursor;
        *cursor = offset.saturating_add(sample_size);
        Ok(SampleParameters { offset, limit })
    }
}

/// Build the provider named by a run configuration.
pub fn sample_strategy_from_config(config: &SampleStrategyConfig) -> Box<dyn SampleStrategy> {
    match config {
        SampleStrategyConfig::Fixed { offset, limit } => {
            Box::new(FixedSampleStrategy::new(*offset, *limit))
        }
        SampleStrategyConfig::Cursor { limit_factor } => {
            Box::new(CursorSampleStrategy::new(*limit_factor))
        }
    }
}
