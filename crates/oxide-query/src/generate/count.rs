//! COUNT generation.

use super::select::{push_filter, push_from};
use crate::query::Query;

/// Generates `SELECT [filter] COUNT(*) FROM src [WHERE] [GROUP BY] [HAVING]`.
///
/// Ordering has no effect on a count and is left out.
pub(super) fn generate(query: &Query) -> String {
    let mut sql = String::from("SELECT ");
    push_filter(&mut sql, query.filter.as_deref());
    sql.push_str("COUNT(*)");
    push_from(&mut sql, query);
    sql
}
