use rand::RngCore;
use rand::seq::IndexedRandom;
use tracing::debug;

use crate::data::{CellChange, CellChanges, Tuple, TuplePair, UsedTuples};
use crate::dirty::DirtyStrategy;
use crate::errors::VioGenError;
use crate::formula::VioGenQuery;

/// Turns a verified pair into concrete cell changes.
pub trait ChangeApplicator: Send + Sync {
    /// Append the changes for `pair` to `changes` and mark both tuples in `used`.
    ///
    /// Returns how many changes were appended (possibly zero).
    fn handle_tuple_pair(
        &self,
        pair: &TuplePair<'_>,
        query: &VioGenQuery,
        changes: &mut CellChanges,
        used: &mut UsedTuples,
        dirty: &dyn DirtyStrategy,
        rng: &mut dyn RngCore,
    ) -> Result<usize, VioGenError>;
}

/// Default applicator: dirties one cell involved in the pair's variable comparisons.
///
/// The cell is drawn at random among the compared attributes of both tuples
/// that the accumulator has not changed yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenerateChanges;

impl GenerateChanges {
    fn candidate_cells<'a>(
        pair: &TuplePair<'a>,
        query: &'a VioGenQuery,
        changes: &CellChanges,
    ) -> Vec<(&'a Tuple, &'a str)> {
        let mut candidates: Vec<(&'a Tuple, &'a str)> = Vec::new();
        for atom in query.formula.inequality_comparisons() {
            for reference in atom.attributes() {
                let Some(tuple) = pair.tuple_for(&reference.alias) else {
                    continue;
                };
                let attribute = reference.attribute.as_str();
                if tuple.value(attribute).is_none() || changes.contains_cell(tuple.oid, attribute) {
                    continue;
                }
                if !candidates
                    .iter()
                    .any(|(seen, seen_attr)| seen.oid == tuple.oid && *seen_attr == attribute)
                {
                    candidates.push((tuple, attribute));
                }
            }
        }
        candidates
    }
}

impl ChangeApplicator for GenerateChanges {
    fn handle_tuple_pair(
        &self,
        pair: &TuplePair<'_>,
        query: &VioGenQuery,
        changes: &mut CellChanges,
        used: &mut UsedTuples,
        dirty: &dyn DirtyStrategy,
        rng: &mut dyn RngCore,
    ) -> Result<usize, VioGenError> {
        used.mark(pair.first);
        used.mark(pair.second);
        let candidates = Self::candidate_cells(pair, query, changes);
        let Some((tuple, attribute)) = candidates.choose(&mut *rng).copied() else {
            debug!(pair = %pair, "no changeable cell left for pair");
            return Ok(0);
        };
        let Some(cell) = tuple.cell(attribute) else {
            return Ok(0);
        };
        let new_value = dirty.generate_new_value(&cell.value, rng);
        debug!(
            oid = cell.oid,
            attribute = %cell.attribute,
            original = %cell.value,
            new_value = %new_value,
            "cell change generated"
        );
        let appended = changes.push(CellChange {
            cell,
            new_value,
            dependency: query.formula.dependency.clone(),
        });
        Ok(usize::from(appended))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VioGenQueryConfig;
    use crate::data::{TableAlias, Value};
    use crate::dirty::TypoAppendString;
    use crate::formula::{AttributeRef, ComparisonAtom, ComparisonOperator, Formula};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn query() -> VioGenQuery {
        let formula = Formula::new(
            "e1",
            vec![ComparisonAtom::between(
                AttributeRef::new(TableAlias::new("a"), "x"),
                ComparisonOperator::Lt,
                AttributeRef::new(TableAlias::new("b"), "x"),
            )],
        );
        VioGenQuery::new(formula, VioGenQueryConfig::default())
    }

    #[test]
    fn one_compared_cell_is_dirtied_and_both_tuples_used() {
        let query = query();
        let a = TableAlias::new("a");
        let b = TableAlias::new("b");
        let first = Tuple::new(1, "a").with("x", 1).with("name", "Bob");
        let second = Tuple::new(2, "b").with("x", 2);
        let pair = TuplePair::new(&first, &a, &second, &b);
        let mut changes = CellChanges::new();
        let mut used = UsedTuples::new();
        let mut rng = StdRng::from_seed([0_u8; 32]);

        let appended = GenerateChanges
            .handle_tuple_pair(
                &pair,
                &query,
                &mut changes,
                &mut used,
                &TypoAppendString::new("x", 2),
                &mut rng,
            )
            .unwrap();

        assert_eq!(appended, 1);
        assert!(used.contains(&first) && used.contains(&second));
        let change = &changes.changes()[0];
        assert_eq!(change.cell.attribute, "x");
        assert!(change.cell.oid == 1 || change.cell.oid == 2);
        assert_eq!(change.new_value, Value::from(format!("{}xx", change.cell.value)));
        assert_eq!(change.dependency, "e1");
    }

    #[test]
    fn already_changed_cells_are_not_changed_twice() {
        let query = query();
        let a = TableAlias::new("a");
        let b = TableAlias::new("b");
        let first = Tuple::new(1, "a").with("x", 1);
        let second = Tuple::new(2, "b").with("x", 2);
        let pair = TuplePair::new(&first, &a, &second, &b);
        let dirty = TypoAppendString::new("x", 1);
        let mut changes = CellChanges::new();
        let mut rng = StdRng::from_seed([3_u8; 32]);

        for _ in 0..2 {
            let mut used = UsedTuples::new();
            let appended = GenerateChanges
                .handle_tuple_pair(&pair, &query, &mut changes, &mut used, &dirty, &mut rng)
                .unwrap();
            assert_eq!(appended, 1);
        }
        let mut used = UsedTuples::new();
        let appended = GenerateChanges
            .handle_tuple_pair(&pair, &query, &mut changes, &mut used, &dirty, &mut rng)
            .unwrap();
        assert_eq!(appended, 0);
        assert_eq!(changes.len(), 2);
        assert_eq!(used.len(), 2);
    }
}
