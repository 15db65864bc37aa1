use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashSet, hash_set};
use std::fmt;
use std::hash::{Hash, Hasher};

pub use crate::types::{AttributeName, DependencyId, TableName, TupleOid};

/// A single cell value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Order two values for comparison atoms.
    ///
    /// Numbers compare numerically across `Int`/`Float`, text compares
    /// lexicographically. `Null`, NaN, and mixed text/number operands are
    /// incomparable and yield `None`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(left), Value::Int(right)) => Some(left.cmp(right)),
            (Value::Int(left), Value::Float(right)) => (*left as f64).partial_cmp(right),
            (Value::Float(left), Value::Int(right)) => left.partial_cmp(&(*right as f64)),
            (Value::Float(left), Value::Float(right)) => left.partial_cmp(right),
            (Value::Text(left), Value::Text(right)) => Some(left.cmp(right)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// One relation instance participating in a cross product.
///
/// The alias suffix distinguishes two instances of the same table (self joins).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableAlias {
    pub table: TableName,
    pub alias: Option<String>,
}

impl TableAlias {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            alias: None,
        }
    }

    pub fn aliased(table: impl Into<TableName>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: Some(alias.into()),
        }
    }
}

impl fmt::Display for TableAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}_{}", self.table, alias),
            None => f.write_str(&self.table),
        }
    }
}

/// A materialized row.
///
/// Identity is the `oid`: two tuples with equal attribute values but
/// different oids are different tuples, and equality/hashing never look at
/// the cells.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tuple {
    pub oid: TupleOid,
    pub table: TableName,
    pub cells: IndexMap<AttributeName, Value>,
}

impl Tuple {
    pub fn new(oid: TupleOid, table: impl Into<TableName>) -> Self {
        Self {
            oid,
            table: table.into(),
            cells: IndexMap::new(),
        }
    }

    /// Builder-style helper to attach a cell value.
    pub fn with(mut self, attribute: impl Into<AttributeName>, value: impl Into<Value>) -> Self {
        self.cells.insert(attribute.into(), value.into());
        self
    }

    pub fn value(&self, attribute: &str) -> Option<&Value> {
        self.cells.get(attribute)
    }

    /// Cell handle for `attribute`, if the tuple has it.
    pub fn cell(&self, attribute: &str) -> Option<Cell> {
        self.cells.get(attribute).map(|value| Cell {
            oid: self.oid,
            table: self.table.clone(),
            attribute: attribute.to_string(),
            value: value.clone(),
        })
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}

impl Eq for Tuple {}

impl Hash for Tuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.oid.hash(state);
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[oid={}](", self.table, self.oid)?;
        for (idx, (attribute, value)) in self.cells.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{attribute}={value}")?;
        }
        f.write_str(")")
    }
}

/// A single cell, with the value it held when it was read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub oid: TupleOid,
    pub table: TableName,
    pub attribute: AttributeName,
    pub value: Value,
}

/// One mutation record: the original cell and the value replacing it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellChange {
    pub cell: Cell,
    pub new_value: Value,
    /// Dependency whose violation this change materializes.
    pub dependency: DependencyId,
}

/// Run-scoped, append-only accumulator of cell changes.
///
/// A cell can be changed at most once per accumulator.
#[derive(Clone, Debug, Default)]
pub struct CellChanges {
    changes: Vec<CellChange>,
    changed_cells: HashSet<(TupleOid, AttributeName)>,
}

impl CellChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `change`; returns `false` (and records nothing) when the cell was already changed.
    pub fn push(&mut self, change: CellChange) -> bool {
        let key = (change.cell.oid, change.cell.attribute.clone());
        if !self.changed_cells.insert(key) {
            return false;
        }
        self.changes.push(change);
        true
    }

    pub fn contains_cell(&self, oid: TupleOid, attribute: &str) -> bool {
        self.changed_cells.contains(&(oid, attribute.to_string()))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[CellChange] {
        &self.changes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CellChange> {
        self.changes.iter()
    }
}

impl<'a> IntoIterator for &'a CellChanges {
    type Item = &'a CellChange;
    type IntoIter = std::slice::Iter<'a, CellChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Tuples consumed by an accepted change within one invocation.
#[derive(Clone, Debug, Default)]
pub struct UsedTuples {
    oids: HashSet<TupleOid>,
}

impl UsedTuples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, tuple: &Tuple) -> bool {
        self.oids.insert(tuple.oid)
    }

    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.oids.contains(&tuple.oid)
    }

    /// True if either tuple of `pair` was already consumed.
    pub fn touches(&self, pair: &TuplePair<'_>) -> bool {
        self.contains(pair.first) || self.contains(pair.second)
    }

    pub fn len(&self) -> usize {
        self.oids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oids.is_empty()
    }

    pub fn iter(&self) -> hash_set::Iter<'_, TupleOid> {
        self.oids.iter()
    }
}

/// Candidate violation: one tuple from each side of a two-way cross product.
#[derive(Clone, Copy, Debug)]
pub struct TuplePair<'a> {
    pub first: &'a Tuple,
    pub first_alias: &'a TableAlias,
    pub second: &'a Tuple,
    pub second_alias: &'a TableAlias,
}

impl<'a> TuplePair<'a> {
    pub fn new(
        first: &'a Tuple,
        first_alias: &'a TableAlias,
        second: &'a Tuple,
        second_alias: &'a TableAlias,
    ) -> Self {
        Self {
            first,
            first_alias,
            second,
            second_alias,
        }
    }

    /// Tuple bound to `alias` in this pair.
    pub fn tuple_for(&self, alias: &TableAlias) -> Option<&'a Tuple> {
        if alias == self.first_alias {
            Some(self.first)
        } else if alias == self.second_alias {
            Some(self.second)
        } else {
            None
        }
    }
}

impl PartialEq for TuplePair<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.first.oid == other.first.oid
            && self.second.oid == other.second.oid
            && self.first_alias == other.first_alias
            && self.second_alias == other.second_alias
    }
}

impl Eq for TuplePair<'_> {}

impl Hash for TuplePair<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.first.oid.hash(state);
        self.first_alias.hash(state);
        self.second.oid.hash(state);
        self.second_alias.hash(state);
    }
}

impl fmt::Display for TuplePair<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} as {}, {} as {})",
            self.first, self.first_alias, self.second, self.second_alias
        )
    }
}
