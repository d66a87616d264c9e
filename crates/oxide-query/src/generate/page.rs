//! Paged SELECT generation using `ROW_NUMBER()`.

use super::select::{push_columns, push_filter, push_from};
use crate::query::Query;

/// Row number column added by the paging subquery.
pub const ROW_NUMBER_ALIAS: &str = "__row";

/// Alias of the paging subquery.
pub const PAGE_ALIAS: &str = "__page";

/// One-based inclusive row range of a zero-based page.
fn bounds(number: u64, size: u64) -> (u64, u64) {
    let first = number.saturating_mul(size).saturating_add(1);
    let last = number.saturating_add(1).saturating_mul(size);
    (first, last)
}

/// Generates the paged select.
///
/// The inner query numbers its rows by the `ORDER BY` clause; the outer query
/// keeps the rows of the requested page and orders them by the outer order,
/// or by row number when none was given.
pub(super) fn generate(query: &Query) -> String {
    let (first, last) = bounds(query.page_number, query.page_size);
    let order_by = query.order_by.as_deref().unwrap_or_default();

    let mut sql = String::from("SELECT * FROM (SELECT ");
    push_filter(&mut sql, query.filter.as_deref());
    push_columns(&mut sql, query);
    sql.push_str(&format!(
        ", ROW_NUMBER() OVER (ORDER BY {order_by}) AS {ROW_NUMBER_ALIAS}"
    ));
    push_from(&mut sql, query);
    sql.push_str(&format!(
        ") AS {PAGE_ALIAS} WHERE {ROW_NUMBER_ALIAS} BETWEEN {first} AND {last} ORDER BY "
    ));
    sql.push_str(
        query
            .outer_order_by
            .as_deref()
            .unwrap_or(ROW_NUMBER_ALIAS),
    );

    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert_eq!(bounds(0, 10), (1, 10));
        assert_eq!(bounds(2, 10), (21, 30));
        assert_eq!(bounds(u64::MAX, 10), (u64::MAX, u64::MAX));
    }

    #[test]
    fn test_first_page() {
        let query = Query::new().from("users").order_by("id").page(0, 10);
        assert_eq!(
            generate(&query),
            "SELECT * FROM (SELECT *, ROW_NUMBER() OVER (ORDER BY id) AS __row FROM users) \
             AS __page WHERE __row BETWEEN 1 AND 10 ORDER BY __row"
        );
    }

    #[test]
    fn test_page_with_clauses_and_outer_order() {
        let query = Query::new()
            .from("users")
            .columns(&["id", "name"])
            .where_clause("active = @active")
            .order_by("created_at DESC")
            .outer_order_by("name")
            .page(2, 10);
        assert_eq!(
            generate(&query),
            "SELECT * FROM (SELECT id, name, ROW_NUMBER() OVER (ORDER BY created_at DESC) \
             AS __row FROM users WHERE active = @active) AS __page \
             WHERE __row BETWEEN 21 AND 30 ORDER BY name"
        );
    }
}
