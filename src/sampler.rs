//! Quota-driven sampling of inequality violations over a two-way cross product.
//!
//! One `InequalitySampler::execute` call:
//! - validates the query (variable inequalities only, exactly two aliases,
//!   random mode),
//! - computes the quota and, optionally, an offset of leading candidate pairs
//!   to skip,
//! - materializes both sides (optionally capped by `limit + offset`),
//! - walks the pairs once (primary pass), keeping a retry list of pairs that
//!   were skipped positionally or by the keep/discard draw,
//! - replays the retry list if the quota is still unmet (retry pass).
//!
//! Missing the quota is a normal outcome reported through `VioGenReport`.

use indexmap::IndexSet;
use rand::{Rng, RngCore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::algebra::AlgebraPlan;
use crate::backend::QueryRunner;
use crate::changes::{ChangeApplicator, GenerateChanges};
use crate::config::RunConfig;
use crate::constants::sampler::{INEQUALITY_QUERY_TYPE, QUERY_SEED_OFFSET};
use crate::data::{CellChanges, TableAlias, Tuple, TuplePair, UsedTuples};
use crate::dirty::{DirtyStrategy, dirty_strategy_from_config};
use crate::errors::VioGenError;
use crate::formula::VioGenQuery;
use crate::hash::stable_hash_str;
use crate::heuristics::{
    PercentageSampleSize, SampleScope, SampleSizeStrategy, SampleStrategy,
    sample_strategy_from_config,
};

/// Per-invocation summaries go to `info` when verbose, `debug` otherwise.
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            info!($($arg)+);
        } else {
            debug!($($arg)+);
        }
    };
}

#[derive(Debug, Clone)]
/// Small deterministic RNG used for reproducible keep/discard draws.
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Seed derived from the run seed and the query's dependency.
    fn for_query(seed: u64, dependency: &str) -> Self {
        Self::new(stable_hash_str(seed ^ QUERY_SEED_OFFSET, dependency))
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64_internal().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Bernoulli draw: true with the given probability.
fn pick_random<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    rng.random::<f64>() < probability
}

/// Run-scoped collaborators and configuration shared by every query of a run.
#[derive(Clone)]
pub struct RunContext {
    pub config: RunConfig,
    pub runner: Arc<dyn QueryRunner>,
}

impl RunContext {
    pub fn new(config: RunConfig, runner: Arc<dyn QueryRunner>) -> Self {
        Self { config, runner }
    }
}

/// Counters describing one `execute` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VioGenReport {
    /// Quota computed for the query.
    pub sample_size: usize,
    /// Leading eligible pairs skipped positionally.
    pub offset: usize,
    /// Tuples materialized for the first alias.
    pub first_candidates: usize,
    /// Tuples materialized for the second alias.
    pub second_candidates: usize,
    /// Pairs set aside for the retry pass.
    pub discarded_pairs: usize,
    /// Pairs that failed verification during the primary pass.
    pub rejected_pairs: usize,
    /// Changes appended during the primary pass.
    pub primary_changes: usize,
    /// Changes appended during the retry pass.
    pub retry_changes: usize,
}

impl VioGenReport {
    pub fn executed_changes(&self) -> usize {
        self.primary_changes + self.retry_changes
    }

    pub fn is_under_quota(&self) -> bool {
        self.executed_changes() < self.sample_size
    }
}

/// How the primary pass classified one pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PairVerdict {
    /// Verified; handed to the change applicator.
    Accepted,
    /// Skipped by the offset; retry-eligible.
    DiscardedByOffset,
    /// Lost the keep/discard draw; retry-eligible.
    DiscardedByDraw,
    /// Failed verification; never retried.
    Rejected,
}

impl PairVerdict {
    fn is_retry_eligible(self) -> bool {
        matches!(
            self,
            PairVerdict::DiscardedByOffset | PairVerdict::DiscardedByDraw
        )
    }
}

/// Materialized tuples of both cross-product sides.
pub(crate) struct CandidateSets {
    first_alias: TableAlias,
    first: Vec<Tuple>,
    second_alias: TableAlias,
    second: Vec<Tuple>,
}

#[derive(Clone, Copy, Debug)]
struct Quota {
    initial_changes: usize,
    sample_size: usize,
}

impl Quota {
    fn produced(&self, changes: &CellChanges) -> usize {
        changes.len().saturating_sub(self.initial_changes)
    }

    fn is_met(&self, changes: &CellChanges) -> bool {
        self.produced(changes) >= self.sample_size
    }
}

/// Mutable classification state owned by a single `execute` call.
struct Invocation<'t> {
    quota: Quota,
    used: UsedTuples,
    discarded: IndexSet<TuplePair<'t>>,
    rng: DeterministicRng,
    report: VioGenReport,
}

impl Invocation<'_> {
    fn new(quota: Quota, rng: DeterministicRng) -> Self {
        Self {
            quota,
            used: UsedTuples::new(),
            discarded: IndexSet::new(),
            rng,
            report: VioGenReport {
                sample_size: quota.sample_size,
                ..VioGenReport::default()
            },
        }
    }
}

/// Violation sampling engine for inequality-only, two-alias queries.
pub struct InequalitySampler {
    sample_size: Box<dyn SampleSizeStrategy>,
    sample_strategy: Box<dyn SampleStrategy>,
    dirty: Box<dyn DirtyStrategy>,
    applicator: Box<dyn ChangeApplicator>,
}

impl InequalitySampler {
    /// Assemble the strategies named by `config`.
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            sample_size: Box::new(PercentageSampleSize),
            sample_strategy: sample_strategy_from_config(&config.sample_strategy),
            dirty: dirty_strategy_from_config(&config.dirty_strategy),
            applicator: Box::new(GenerateChanges),
        }
    }

    pub fn with_sample_size_strategy(mut self, strategy: impl SampleSizeStrategy + 'static) -> Self {
        self.sample_size = Box::new(strategy);
        self
    }

    pub fn with_sample_strategy(mut self, strategy: impl SampleStrategy + 'static) -> Self {
        self.sample_strategy = Box::new(strategy);
        self
    }

    pub fn with_dirty_strategy(mut self, strategy: impl DirtyStrategy + 'static) -> Self {
        self.dirty = Box::new(strategy);
        self
    }

    pub fn with_change_applicator(mut self, applicator: impl ChangeApplicator + 'static) -> Self {
        self.applicator = Box::new(applicator);
        self
    }

    /// Append up to the query's quota of violating changes to `changes`.
    ///
    /// Configuration rejections are returned before anything is materialized
    /// and leave `changes` untouched. Backend errors propagate unchanged.
    pub fn execute(
        &self,
        query: &VioGenQuery,
        changes: &mut CellChanges,
        ctx: &RunContext,
    ) -> Result<VioGenReport, VioGenError> {
        let verbose = ctx.config.verbose;
        progress!(verbose, query = %query, "violation query");
        Self::check_conditions(query, &ctx.config)?;
        query.config.validate()?;

        let sample_size = self.sample_size.sample_size(query, ctx)?;
        if sample_size == 0 {
            progress!(verbose, dependency = %query.dependency(), "no changes required");
            return Ok(VioGenReport::default());
        }
        progress!(
            verbose,
            dependency = %query.dependency(),
            percentage = query.config.percentage,
            sample_size,
            "changes required"
        );

        let quota = Quota {
            initial_changes: changes.len(),
            sample_size,
        };
        let offset = self.compute_offset(query, sample_size, ctx)?;
        let candidates = self.materialize_candidates(query, sample_size, offset, ctx)?;
        let rng = DeterministicRng::for_query(ctx.config.seed, query.dependency());
        let mut state = Invocation::new(quota, rng);
        state.report.offset = offset;
        state.report.first_candidates = candidates.first.len();
        state.report.second_candidates = candidates.second.len();

        self.find_violations(query, &candidates, offset, changes, &mut state)?;
        state.report.discarded_pairs = state.discarded.len();
        state.report.primary_changes = quota.produced(changes);

        if !quota.is_met(changes) {
            info!(
                dependency = %query.dependency(),
                remaining = sample_size - quota.produced(changes),
                discarded = state.discarded.len(),
                "quota unmet after primary pass; replaying discarded pairs"
            );
            self.execute_discarded_pairs(query, changes, &mut state)?;
            state.report.retry_changes = quota.produced(changes) - state.report.primary_changes;
        }

        progress!(
            verbose,
            dependency = %query.dependency(),
            executed = state.report.executed_changes(),
            sample_size,
            "executed changes"
        );
        if state.report.is_under_quota() {
            info!(
                dependency = %query.dependency(),
                executed = state.report.executed_changes(),
                sample_size,
                "not enough candidate pairs to meet the quota"
            );
        }
        Ok(state.report)
    }

    fn check_conditions(query: &VioGenQuery, config: &RunConfig) -> Result<(), VioGenError> {
        let formula = &query.formula;
        if !formula.has_only_variable_inequalities() {
            return Err(VioGenError::EqualityComparison {
                dependency: formula.dependency.clone(),
            });
        }
        let aliases = formula.cross_product.aliases.len();
        if aliases != 2 {
            return Err(VioGenError::CrossProductArity {
                dependency: formula.dependency.clone(),
                found: aliases,
            });
        }
        if config.generate_all_changes {
            return Err(VioGenError::ExhaustiveMode);
        }
        Ok(())
    }

    fn compute_offset(
        &self,
        query: &VioGenQuery,
        sample_size: usize,
        ctx: &RunContext,
    ) -> Result<usize, VioGenError> {
        if !query.config.use_offset_in_inequality_queries {
            return Ok(0);
        }
        let aliases = query.formula.table_aliases();
        let parameters = self.sample_strategy.compute_parameters(
            SampleScope::Query(query),
            &aliases,
            INEQUALITY_QUERY_TYPE,
            sample_size,
            &query.config,
            ctx,
        )?;
        debug!(offset = parameters.offset, "offset computed");
        Ok(parameters.offset)
    }

    fn materialize_candidates(
        &self,
        query: &VioGenQuery,
        sample_size: usize,
        offset: usize,
        ctx: &RunContext,
    ) -> Result<CandidateSets, VioGenError> {
        debug!(
            comparisons = ?query
                .formula
                .inequality_comparisons()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            "inequality comparisons"
        );
        let aliases = &query.formula.cross_product.aliases;
        let mut sides = Vec::with_capacity(2);
        for alias in aliases.iter().take(2) {
            let plan = query.formula.candidate_plan(alias);
            let plan = self.add_limit(plan, alias, query, sample_size, offset, ctx)?;
            debug!(alias = %alias, operator = %plan, "candidate operator");
            let tuples = ctx.runner.run(&plan)?;
            debug!(alias = %alias, tuples = tuples.len(), "candidates materialized");
            sides.push((alias.clone(), tuples));
        }
        let mut sides = sides.into_iter();
        let (Some((first_alias, first)), Some((second_alias, second))) =
            (sides.next(), sides.next())
        else {
            return Err(VioGenError::CrossProductArity {
                dependency: query.formula.dependency.clone(),
                found: aliases.len(),
            });
        };
        Ok(CandidateSets {
            first_alias,
            first,
            second_alias,
            second,
        })
    }

    fn add_limit(
        &self,
        plan: AlgebraPlan,
        alias: &TableAlias,
        query: &VioGenQuery,
        sample_size: usize,
        offset: usize,
        ctx: &RunContext,
    ) -> Result<AlgebraPlan, VioGenError> {
        if !query.config.use_limit_in_inequality_queries {
            return Ok(plan);
        }
        let scope: BTreeSet<TableAlias> = [alias.clone()].into_iter().collect();
        let parameters = self.sample_strategy.compute_parameters(
            SampleScope::Plan(&plan),
            &scope,
            INEQUALITY_QUERY_TYPE,
            sample_size,
            &query.config,
            ctx,
        )?;
        Ok(plan.limit(parameters.limit.saturating_add(offset)))
    }

    /// Offset skip, keep/discard draw, then verification.
    fn classify(
        query: &VioGenQuery,
        pair: &TuplePair<'_>,
        discarded_so_far: usize,
        offset: usize,
        rng: &mut DeterministicRng,
    ) -> PairVerdict {
        if discarded_so_far < offset {
            return PairVerdict::DiscardedByOffset;
        }
        if !pick_random(rng, query.config.probability_factor_for_inequality_queries) {
            return PairVerdict::DiscardedByDraw;
        }
        if !query.formula.verify_on_pair(pair) {
            return PairVerdict::Rejected;
        }
        PairVerdict::Accepted
    }

    /// Primary pass over the cross product in materialization order.
    fn find_violations<'t>(
        &self,
        query: &VioGenQuery,
        candidates: &'t CandidateSets,
        offset: usize,
        changes: &mut CellChanges,
        state: &mut Invocation<'t>,
    ) -> Result<(), VioGenError> {
        for first in &candidates.first {
            if state.used.contains(first) {
                continue;
            }
            for second in &candidates.second {
                let pair = TuplePair::new(
                    first,
                    &candidates.first_alias,
                    second,
                    &candidates.second_alias,
                );
                if state.used.touches(&pair) {
                    continue;
                }
                let verdict =
                    Self::classify(query, &pair, state.discarded.len(), offset, &mut state.rng);
                if verdict.is_retry_eligible() {
                    state.discarded.insert(pair);
                    continue;
                }
                if verdict == PairVerdict::Rejected {
                    state.report.rejected_pairs += 1;
                    continue;
                }
                debug!(pair = %pair, "tuple pair to handle");
                self.applicator.handle_tuple_pair(
                    &pair,
                    query,
                    changes,
                    &mut state.used,
                    self.dirty.as_ref(),
                    &mut state.rng,
                )?;
                if state.quota.is_met(changes) {
                    debug!(dependency = %query.dependency(), "all changes generated");
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Retry pass: replay discarded pairs once, in insertion order.
    fn execute_discarded_pairs(
        &self,
        query: &VioGenQuery,
        changes: &mut CellChanges,
        state: &mut Invocation<'_>,
    ) -> Result<(), VioGenError> {
        let discarded = std::mem::take(&mut state.discarded);
        for pair in &discarded {
            if state.used.touches(pair) {
                continue;
            }
            if !query.formula.verify_on_pair(pair) {
                continue;
            }
            self.applicator.handle_tuple_pair(
                pair,
                query,
                changes,
                &mut state.used,
                self.dirty.as_ref(),
                &mut state.rng,
            )?;
            if state.quota.is_met(changes) {
                return Ok(());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryDatabase;
    use crate::config::VioGenQueryConfig;
    use crate::data::TupleOid;
    use crate::formula::{AttributeRef, ComparisonAtom, ComparisonOperator, Formula};
    use crate::heuristics::{FixedSampleSize, FixedSampleStrategy};

    fn less_than_query(config: VioGenQueryConfig) -> VioGenQuery {
        let formula = Formula::new(
            "e1",
            vec![ComparisonAtom::between(
                AttributeRef::new(TableAlias::new("a"), "x"),
                ComparisonOperator::Lt,
                AttributeRef::new(TableAlias::new("b"), "x"),
            )],
        );
        VioGenQuery::new(formula, config)
    }

    fn always_keep() -> VioGenQueryConfig {
        VioGenQueryConfig {
            probability_factor_for_inequality_queries: 1.0,
            use_offset_in_inequality_queries: false,
            use_limit_in_inequality_queries: false,
            ..VioGenQueryConfig::default()
        }
    }

    fn candidates(a: &[i64], b: &[i64]) -> CandidateSets {
        let mut db = InMemoryDatabase::new();
        db.insert_column("a", "x", a.iter().copied());
        db.insert_column("b", "x", b.iter().copied());
        CandidateSets {
            first_alias: TableAlias::new("a"),
            first: db.tuples("a").unwrap().to_vec(),
            second_alias: TableAlias::new("b"),
            second: db.tuples("b").unwrap().to_vec(),
        }
    }

    fn oids(pair: &TuplePair<'_>) -> (TupleOid, TupleOid) {
        (pair.first.oid, pair.second.oid)
    }

    #[test]
    fn offset_discards_exactly_the_leading_eligible_pairs() {
        let query = less_than_query(always_keep());
        let candidates = candidates(&[1, 2, 3], &[10, 20, 30]);
        let sampler = InequalitySampler::from_config(&RunConfig::default());
        let quota = Quota {
            initial_changes: 0,
            sample_size: 1,
        };
        let mut state = Invocation::new(quota, DeterministicRng::new(7));
        let mut changes = CellChanges::new();

        sampler
            .find_violations(&query, &candidates, 2, &mut changes, &mut state)
            .unwrap();

        let discarded: Vec<_> = state.discarded.iter().map(oids).collect();
        assert_eq!(discarded, vec![(1, 4), (1, 5)]);
        assert_eq!(changes.len(), 1);
        let changed = changes.changes()[0].cell.oid;
        assert!(changed == 1 || changed == 6, "third pair (1, 6) should be accepted");
    }

    #[test]
    fn zero_probability_discards_every_eligible_pair() {
        let query = less_than_query(VioGenQueryConfig {
            probability_factor_for_inequality_queries: 0.0,
            ..always_keep()
        });
        let candidates = candidates(&[1, 2], &[3, 4]);
        let sampler = InequalitySampler::from_config(&RunConfig::default());
        let quota = Quota {
            initial_changes: 0,
            sample_size: 4,
        };
        let mut state = Invocation::new(quota, DeterministicRng::new(1));
        let mut changes = CellChanges::new();

        sampler
            .find_violations(&query, &candidates, 0, &mut changes, &mut state)
            .unwrap();
        assert!(changes.is_empty());
        assert_eq!(state.discarded.len(), 4);

        sampler
            .execute_discarded_pairs(&query, &mut changes, &mut state)
            .unwrap();
        // (1,3) then (2,4); (1,4) and (2,3) share a consumed tuple.
        assert_eq!(changes.len(), 2);
        assert!(state.discarded.is_empty());
    }

    #[test]
    fn rejected_pairs_never_enter_the_retry_list() {
        let query = less_than_query(always_keep());
        let candidates = candidates(&[5, 1], &[3]);
        let sampler = InequalitySampler::from_config(&RunConfig::default());
        let quota = Quota {
            initial_changes: 0,
            sample_size: 5,
        };
        let mut state = Invocation::new(quota, DeterministicRng::new(3));
        let mut changes = CellChanges::new();

        sampler
            .find_violations(&query, &candidates, 0, &mut changes, &mut state)
            .unwrap();
        assert_eq!(state.report.rejected_pairs, 1);
        assert!(state.discarded.is_empty());
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn classification_order_is_offset_then_draw_then_verification() {
        let query = less_than_query(always_keep());
        let candidates = candidates(&[5], &[3]);
        let pair = TuplePair::new(
            &candidates.first[0],
            &candidates.first_alias,
            &candidates.second[0],
            &candidates.second_alias,
        );
        let mut rng = DeterministicRng::new(11);
        assert_eq!(
            InequalitySampler::classify(&query, &pair, 0, 1, &mut rng),
            PairVerdict::DiscardedByOffset
        );
        assert_eq!(
            InequalitySampler::classify(&query, &pair, 1, 1, &mut rng),
            PairVerdict::Rejected
        );
        let never = less_than_query(VioGenQueryConfig {
            probability_factor_for_inequality_queries: 0.0,
            ..always_keep()
        });
        assert_eq!(
            InequalitySampler::classify(&never, &pair, 0, 0, &mut rng),
            PairVerdict::DiscardedByDraw
        );
    }

    #[test]
    fn limit_is_offset_plus_provider_limit() {
        let mut db = InMemoryDatabase::new();
        db.insert_column("a", "x", [1, 2, 3, 4, 5]);
        db.insert_column("b", "x", [6, 7, 8, 9, 10]);
        let ctx = RunContext::new(RunConfig::default(), Arc::new(db));
        let query = less_than_query(VioGenQueryConfig {
            use_limit_in_inequality_queries: true,
            ..always_keep()
        });
        let sampler = InequalitySampler::from_config(&RunConfig::default())
            .with_sample_size_strategy(FixedSampleSize(1))
            .with_sample_strategy(FixedSampleStrategy::new(1, 2));

        let candidates = sampler.materialize_candidates(&query, 1, 1, &ctx).unwrap();
        assert_eq!(candidates.first.len(), 3);
        assert_eq!(candidates.second.len(), 3);
    }

    #[test]
    fn deterministic_rng_is_reproducible() {
        let mut left = DeterministicRng::for_query(42, "e1");
        let mut right = DeterministicRng::for_query(42, "e1");
        let mut other = DeterministicRng::for_query(42, "e2");
        let left_draws: Vec<u64> = (0..4).map(|_| left.next_u64()).collect();
        let right_draws: Vec<u64> = (0..4).map(|_| right.next_u64()).collect();
        let other_draws: Vec<u64> = (0..4).map(|_| other.next_u64()).collect();
        assert_eq!(left_draws, right_draws);
        assert_ne!(left_draws, other_draws);

        let mut bytes = [0_u8; 11];
        left.fill_bytes(&mut bytes);
        assert!(bytes.iter().any(|byte| *byte != 0));
    }
}
