use std::collections::BTreeSet;
use std::fmt;

use crate::data::TableAlias;
use crate::formula::ComparisonAtom;

/// Bounded relational plan evaluated by a `QueryRunner`.
#[derive(Clone, Debug, PartialEq)]
pub enum AlgebraPlan {
    /// Every tuple of the alias's table, in storage order.
    Scan { alias: TableAlias },
    /// Tuples of `input` satisfying all `atoms`.
    Select {
        input: Box<AlgebraPlan>,
        atoms: Vec<ComparisonAtom>,
    },
    /// At most `count` leading tuples of `input`.
    Limit { input: Box<AlgebraPlan>, count: usize },
}

impl AlgebraPlan {
    pub fn scan(alias: TableAlias) -> Self {
        AlgebraPlan::Scan { alias }
    }

    pub fn select(self, atoms: Vec<ComparisonAtom>) -> Self {
        AlgebraPlan::Select {
            input: Box::new(self),
            atoms,
        }
    }

    pub fn limit(self, count: usize) -> Self {
        AlgebraPlan::Limit {
            input: Box::new(self),
            count,
        }
    }

    /// Aliases scanned anywhere in the plan.
    pub fn aliases(&self) -> BTreeSet<TableAlias> {
        let mut aliases = BTreeSet::new();
        self.collect_aliases(&mut aliases);
        aliases
    }

    fn collect_aliases(&self, aliases: &mut BTreeSet<TableAlias>) {
        match self {
            AlgebraPlan::Scan { alias } => {
                aliases.insert(alias.clone());
            }
            AlgebraPlan::Select { input, .. } | AlgebraPlan::Limit { input, .. } => {
                input.collect_aliases(aliases)
            }
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "    ".repeat(depth);
        match self {
            AlgebraPlan::Scan { alias } => writeln!(f, "{indent}SCAN({alias})"),
            AlgebraPlan::Select { input, atoms } => {
                let rendered: Vec<String> = atoms.iter().map(ToString::to_string).collect();
                writeln!(f, "{indent}SELECT[{}]", rendered.join(" AND "))?;
                input.fmt_indented(f, depth + 1)
            }
            AlgebraPlan::Limit { input, count } => {
                writeln!(f, "{indent}LIMIT({count})")?;
                input.fmt_indented(f, depth + 1)
            }
        }
    }
}

impl fmt::Display for AlgebraPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
