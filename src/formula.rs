//! Comparison formulas over two tuple variables.
//!
//! A `Formula` is an already-built conjunction of comparison atoms whose
//! attribute operands are bound to the table aliases of a two-way cross
//! product. Atoms touching a single alias act as per-side filters, atoms
//! relating both aliases are the "variable" comparisons checked on pairs.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::algebra::AlgebraPlan;
use crate::config::VioGenQueryConfig;
use crate::data::{TableAlias, Tuple, TuplePair, Value};
use crate::types::{AttributeName, DependencyId};

/// Comparison operator of an atom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOperator {
    pub fn is_inequality(self) -> bool {
        !matches!(self, ComparisonOperator::Eq)
    }

    /// Evaluate against an ordering; incomparable operands never satisfy an atom.
    pub fn holds(self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return false;
        };
        match self {
            ComparisonOperator::Eq => ordering == Ordering::Equal,
            ComparisonOperator::Neq => ordering != Ordering::Equal,
            ComparisonOperator::Lt => ordering == Ordering::Less,
            ComparisonOperator::Le => ordering != Ordering::Greater,
            ComparisonOperator::Gt => ordering == Ordering::Greater,
            ComparisonOperator::Ge => ordering != Ordering::Less,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "==",
            ComparisonOperator::Neq => "!=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Le => "<=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Ge => ">=",
        }
    }
}

/// Attribute of the tuple variable bound to `alias`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeRef {
    pub alias: TableAlias,
    pub attribute: AttributeName,
}

impl AttributeRef {
    pub fn new(alias: TableAlias, attribute: impl Into<AttributeName>) -> Self {
        Self {
            alias,
            attribute: attribute.into(),
        }
    }
}

/// One side of a comparison atom.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Attribute(AttributeRef),
    Constant(Value),
}

impl Operand {
    pub fn attribute(&self) -> Option<&AttributeRef> {
        match self {
            Operand::Attribute(reference) => Some(reference),
            Operand::Constant(_) => None,
        }
    }

    fn resolve<'a>(&'a self, lookup: &impl Fn(&TableAlias) -> Option<&'a Tuple>) -> Option<&'a Value> {
        match self {
            Operand::Attribute(reference) => lookup(&reference.alias)?.value(&reference.attribute),
            Operand::Constant(value) => Some(value),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Attribute(reference) => write!(f, "{}.{}", reference.alias, reference.attribute),
            Operand::Constant(Value::Text(text)) => write!(f, "\"{text}\""),
            Operand::Constant(value) => write!(f, "{value}"),
        }
    }
}

/// `left <operator> right`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComparisonAtom {
    pub left: Operand,
    pub operator: ComparisonOperator,
    pub right: Operand,
}

impl ComparisonAtom {
    pub fn new(left: Operand, operator: ComparisonOperator, right: Operand) -> Self {
        Self {
            left,
            operator,
            right,
        }
    }

    /// Atom relating attributes of two different aliases.
    pub fn between(
        left: AttributeRef,
        operator: ComparisonOperator,
        right: AttributeRef,
    ) -> Self {
        Self::new(Operand::Attribute(left), operator, Operand::Attribute(right))
    }

    /// Atom filtering one alias against a constant.
    pub fn with_constant(
        left: AttributeRef,
        operator: ComparisonOperator,
        constant: impl Into<Value>,
    ) -> Self {
        Self::new(
            Operand::Attribute(left),
            operator,
            Operand::Constant(constant.into()),
        )
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeRef> {
        self.left.attribute().into_iter().chain(self.right.attribute())
    }

    /// True when the two operands are attributes of different aliases.
    pub fn is_variable_comparison(&self) -> bool {
        match (self.left.attribute(), self.right.attribute()) {
            (Some(left), Some(right)) => left.alias != right.alias,
            _ => false,
        }
    }

    /// True when every attribute operand belongs to `alias`.
    pub fn is_local_to(&self, alias: &TableAlias) -> bool {
        let mut attributes = self.attributes().peekable();
        attributes.peek().is_some() && attributes.all(|reference| &reference.alias == alias)
    }

    /// Evaluate using `lookup` to bind aliases to tuples.
    pub fn evaluate<'a>(&'a self, lookup: impl Fn(&TableAlias) -> Option<&'a Tuple>) -> bool {
        let (Some(left), Some(right)) = (self.left.resolve(&lookup), self.right.resolve(&lookup))
        else {
            return false;
        };
        self.operator.holds(left.compare(right))
    }

    /// Evaluate against a single tuple bound to `alias`.
    pub fn evaluate_on(&self, alias: &TableAlias, tuple: &Tuple) -> bool {
        self.evaluate(|candidate| (candidate == alias).then_some(tuple))
    }
}

impl fmt::Display for ComparisonAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.operator.symbol(), self.right)
    }
}

/// Table aliases of a cross product, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossProduct {
    pub aliases: Vec<TableAlias>,
}

impl CrossProduct {
    pub fn new(aliases: impl IntoIterator<Item = TableAlias>) -> Self {
        let mut distinct: Vec<TableAlias> = Vec::new();
        for alias in aliases {
            if !distinct.contains(&alias) {
                distinct.push(alias);
            }
        }
        Self { aliases: distinct }
    }
}

/// Conjunction of comparison atoms over the tuple variables of a cross product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub dependency: DependencyId,
    pub atoms: Vec<ComparisonAtom>,
    pub cross_product: CrossProduct,
}

impl Formula {
    /// Build a formula whose cross product spans the aliases referenced by `atoms`.
    pub fn new(dependency: impl Into<DependencyId>, atoms: Vec<ComparisonAtom>) -> Self {
        let cross_product = CrossProduct::new(
            atoms
                .iter()
                .flat_map(|atom| atom.attributes().map(|reference| reference.alias.clone()))
                .collect::<Vec<_>>(),
        );
        Self {
            dependency: dependency.into(),
            atoms,
            cross_product,
        }
    }

    /// Comparisons relating the two aliases.
    pub fn inequality_comparisons(&self) -> Vec<&ComparisonAtom> {
        self.atoms
            .iter()
            .filter(|atom| atom.is_variable_comparison())
            .collect()
    }

    /// Comparisons evaluated on a single alias before pairing.
    pub fn local_comparisons(&self, alias: &TableAlias) -> Vec<&ComparisonAtom> {
        self.atoms
            .iter()
            .filter(|atom| atom.is_local_to(alias))
            .collect()
    }

    /// False if any comparison between the two variables is an equality.
    pub fn has_only_variable_inequalities(&self) -> bool {
        self.atoms
            .iter()
            .filter(|atom| atom.is_variable_comparison())
            .all(|atom| atom.operator.is_inequality())
    }

    /// Aliases referenced by the formula's atoms.
    pub fn table_aliases(&self) -> BTreeSet<TableAlias> {
        self.atoms
            .iter()
            .flat_map(|atom| atom.attributes().map(|reference| reference.alias.clone()))
            .collect()
    }

    /// Candidate-row plan for one side of the cross product.
    pub fn candidate_plan(&self, alias: &TableAlias) -> AlgebraPlan {
        let scan = AlgebraPlan::scan(alias.clone());
        let local: Vec<ComparisonAtom> = self
            .local_comparisons(alias)
            .into_iter()
            .cloned()
            .collect();
        if local.is_empty() {
            scan
        } else {
            scan.select(local)
        }
    }

    /// True if every atom holds for the pair.
    pub fn verify_on_pair(&self, pair: &TuplePair<'_>) -> bool {
        self.atoms
            .iter()
            .all(|atom| atom.evaluate(|alias| pair.tuple_for(alias)))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.dependency)?;
        for (idx, atom) in self.atoms.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{atom}")?;
        }
        Ok(())
    }
}

/// A formula paired with the settings that drive its sampling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VioGenQuery {
    pub formula: Formula,
    pub config: VioGenQueryConfig,
}

impl VioGenQuery {
    pub fn new(formula: Formula, config: VioGenQueryConfig) -> Self {
        Self { formula, config }
    }

    pub fn dependency(&self) -> &str {
        &self.formula.dependency
    }
}

impl fmt::Display for VioGenQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(table: &str, attribute: &str) -> AttributeRef {
        AttributeRef::new(TableAlias::new(table), attribute)
    }

    fn salary_formula() -> Formula {
        Formula::new(
            "e1",
            vec![
                ComparisonAtom::between(attr("a", "x"), ComparisonOperator::Lt, attr("b", "x")),
                ComparisonAtom::with_constant(attr("a", "dept"), ComparisonOperator::Eq, "R&D"),
            ],
        )
    }

    #[test]
    fn operators_follow_orderings() {
        use ComparisonOperator::*;
        assert!(Lt.holds(Some(Ordering::Less)));
        assert!(!Lt.holds(Some(Ordering::Equal)));
        assert!(Le.holds(Some(Ordering::Equal)));
        assert!(Ge.holds(Some(Ordering::Greater)));
        assert!(Neq.holds(Some(Ordering::Less)));
        assert!(!Neq.holds(None));
        assert!(!Eq.is_inequality());
        assert!(Neq.is_inequality());
    }

    #[test]
    fn constant_equalities_do_not_count_as_variable_equalities() {
        let formula = salary_formula();
        assert!(formula.has_only_variable_inequalities());
        assert_eq!(formula.inequality_comparisons().len(), 1);
        assert_eq!(formula.cross_product.aliases.len(), 2);

        let with_equality = Formula::new(
            "e2",
            vec![ComparisonAtom::between(
                attr("a", "x"),
                ComparisonOperator::Eq,
                attr("b", "x"),
            )],
        );
        assert!(!with_equality.has_only_variable_inequalities());
    }

    #[test]
    fn local_atoms_are_pushed_into_candidate_plans() {
        let formula = salary_formula();
        let a_plan = formula.candidate_plan(&TableAlias::new("a"));
        let b_plan = formula.candidate_plan(&TableAlias::new("b"));
        assert!(matches!(a_plan, AlgebraPlan::Select { .. }));
        assert!(matches!(b_plan, AlgebraPlan::Scan { .. }));
    }

    #[test]
    fn pairs_are_verified_against_every_atom() {
        let formula = salary_formula();
        let a = TableAlias::new("a");
        let b = TableAlias::new("b");
        let low = Tuple::new(1, "a").with("x", 1).with("dept", "R&D");
        let low_sales = Tuple::new(2, "a").with("x", 1).with("dept", "Sales");
        let high = Tuple::new(3, "b").with("x", 5);
        assert!(formula.verify_on_pair(&TuplePair::new(&low, &a, &high, &b)));
        assert!(!formula.verify_on_pair(&TuplePair::new(&low_sales, &a, &high, &b)));
        assert!(!formula.verify_on_pair(&TuplePair::new(&high, &a, &low, &b)));
    }

    #[test]
    fn missing_attributes_fail_verification() {
        let formula = salary_formula();
        let a = TableAlias::new("a");
        let b = TableAlias::new("b");
        let first = Tuple::new(1, "a").with("dept", "R&D");
        let second = Tuple::new(2, "b").with("x", 5);
        assert!(!formula.verify_on_pair(&TuplePair::new(&first, &a, &second, &b)));
    }

    #[test]
    fn formulas_render_readably() {
        assert_eq!(
            salary_formula().to_string(),
            "e1: a.x < b.x, a.dept == \"R&D\""
        );
    }
}
