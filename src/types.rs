/// Stable object identifier of a materialized tuple.
/// Example: `7`
pub type TupleOid = u64;
/// Attribute (column) name.
/// Examples: `name`, `salary`
pub type AttributeName = String;
/// Relation name in the backing store.
/// Examples: `emp`, `customers`
pub type TableName = String;
/// Identifier of the dependency a query was derived from.
/// Examples: `e1`, `fd_salary_rank`
pub type DependencyId = String;
/// Query-kind tag handed to sample-parameter providers.
/// Example: `inequality`
pub type QueryKind = &'static str;
