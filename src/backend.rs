//! Backing query execution.
//!
//! `QueryRunner` is the engine-facing interface that materializes bounded
//! plans into tuples. `InMemoryDatabase` is the built-in implementation used
//! for tests and small datasets.

use indexmap::IndexMap;

use crate::algebra::AlgebraPlan;
use crate::data::{Tuple, Value};
use crate::errors::VioGenError;
use crate::types::{AttributeName, TableName, TupleOid};

/// Materializes algebra plans into ordered tuple sequences.
///
/// Repeated runs of the same plan against unchanged data must return the
/// same tuples in the same order.
pub trait QueryRunner: Send + Sync {
    /// Evaluate `plan` and return its tuples.
    fn run(&self, plan: &AlgebraPlan) -> Result<Vec<Tuple>, VioGenError>;

    /// Number of tuples stored in `table`.
    fn table_size(&self, table: &str) -> Result<usize, VioGenError>;
}

/// In-memory tables with globally unique, monotonically assigned oids.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDatabase {
    tables: IndexMap<TableName, Vec<Tuple>>,
    next_oid: TupleOid,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty table (no-op if it already exists).
    pub fn create_table(&mut self, table: impl Into<TableName>) {
        self.tables.entry(table.into()).or_default();
    }

    /// Append a row, creating the table on first use; returns the assigned oid.
    pub fn insert_row<I, K, V>(&mut self, table: &str, cells: I) -> TupleOid
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<AttributeName>,
        V: Into<Value>,
    {
        self.next_oid += 1;
        let oid = self.next_oid;
        let mut tuple = Tuple::new(oid, table);
        for (attribute, value) in cells {
            tuple.cells.insert(attribute.into(), value.into());
        }
        self.tables.entry(table.to_string()).or_default().push(tuple);
        oid
    }

    /// Convenience loader for single-attribute tables.
    pub fn insert_column<V: Into<Value>>(
        &mut self,
        table: &str,
        attribute: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Vec<TupleOid> {
        values
            .into_iter()
            .map(|value| self.insert_row(table, [(attribute, value)]))
            .collect()
    }

    pub fn tuples(&self, table: &str) -> Option<&[Tuple]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    fn table(&self, table: &str) -> Result<&[Tuple], VioGenError> {
        self.tuples(table).ok_or_else(|| VioGenError::Backend {
            details: format!("unknown table '{table}'"),
        })
    }
}

impl QueryRunner for InMemoryDatabase {
    fn run(&self, plan: &AlgebraPlan) -> Result<Vec<Tuple>, VioGenError> {
        match plan {
            AlgebraPlan::Scan { alias } => Ok(self.table(&alias.table)?.to_vec()),
            AlgebraPlan::Select { input, atoms } => {
                let scanned = input.aliases();
                let mut aliases = scanned.iter();
                let (Some(alias), None) = (aliases.next(), aliases.next()) else {
                    return Err(VioGenError::Backend {
                        details: format!(
                            "selection must range over exactly one alias, found {}",
                            scanned.len()
                        ),
                    });
                };
                let tuples = self.run(input)?;
                Ok(tuples
                    .into_iter()
                    .filter(|tuple| atoms.iter().all(|atom| atom.evaluate_on(alias, tuple)))
                    .collect())
            }
            AlgebraPlan::Limit { input, count } => {
                let mut tuples = self.run(input)?;
                tuples.truncate(*count);
                Ok(tuples)
            }
        }
    }

    fn table_size(&self, table: &str) -> Result<usize, VioGenError> {
        Ok(self.table(table)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TableAlias;
    use crate::formula::{AttributeRef, ComparisonAtom, ComparisonOperator};

    fn database() -> InMemoryDatabase {
        let mut db = InMemoryDatabase::new();
        db.insert_column("a", "x", [1, 2, 3]);
        db.insert_column("b", "x", [1, 2, 3]);
        db
    }

    #[test]
    fn oids_are_unique_across_tables() {
        let db = database();
        let a: Vec<TupleOid> = db.tuples("a").unwrap().iter().map(|t| t.oid).collect();
        let b: Vec<TupleOid> = db.tuples("b").unwrap().iter().map(|t| t.oid).collect();
        assert_eq!(a, vec![1, 2, 3]);
        assert_eq!(b, vec![4, 5, 6]);
    }

    #[test]
    fn plans_are_evaluated_in_storage_order() {
        let db = database();
        let alias = TableAlias::new("a");
        let plan = AlgebraPlan::scan(alias.clone())
            .select(vec![ComparisonAtom::with_constant(
                AttributeRef::new(alias, "x"),
                ComparisonOperator::Ge,
                2,
            )])
            .limit(1);
        let tuples = db.run(&plan).unwrap();
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0].value("x"), Some(&Value::Int(2)));
        assert_eq!(db.run(&plan).unwrap(), tuples);
    }

    #[test]
    fn unknown_tables_are_backend_errors() {
        let db = database();
        let err = db.run(&AlgebraPlan::scan(TableAlias::new("missing"))).unwrap_err();
        assert!(matches!(err, VioGenError::Backend { .. }));
        assert!(db.table_size("missing").is_err());
        assert_eq!(db.table_size("a").unwrap(), 3);
    }
}
