//! SELECT generation.

use super::source;
use crate::query::Query;

/// Generates `SELECT [filter] cols FROM src [WHERE] [GROUP BY] [HAVING] [ORDER BY]`.
///
/// `filter` overrides the query's own filter modifier.
pub(super) fn generate(query: &Query, filter: Option<&str>) -> String {
    let mut sql = String::from("SELECT ");
    push_filter(&mut sql, filter);
    push_columns(&mut sql, query);
    push_from(&mut sql, query);

    if let Some(ref order_by) = query.order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by);
    }

    sql
}

pub(super) fn push_filter(sql: &mut String, filter: Option<&str>) {
    if let Some(filter) = filter {
        sql.push_str(filter.trim());
        sql.push(' ');
    }
}

pub(super) fn push_columns(sql: &mut String, query: &Query) {
    if query.columns.is_empty() {
        sql.push('*');
    } else {
        sql.push_str(&query.columns.join(", "));
    }
}

/// Pushes `FROM` and the filtering clauses that follow it.
pub(super) fn push_from(sql: &mut String, query: &Query) {
    sql.push_str(" FROM ");
    sql.push_str(source(query));

    if let Some(ref predicate) = query.predicate {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }

    if let Some(ref group_by) = query.group_by {
        sql.push_str(" GROUP BY ");
        sql.push_str(group_by);
    }

    if let Some(ref having) = query.having {
        sql.push_str(" HAVING ");
        sql.push_str(having);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all() {
        let sql = generate(&Query::new().from("T"), None);
        assert_eq!(sql, "SELECT * FROM T");
    }

    #[test]
    fn test_select_columns() {
        let query = Query::new().from("users").columns(&["id", "name"]);
        assert_eq!(generate(&query, None), "SELECT id, name FROM users");
    }

    #[test]
    fn test_select_every_clause() {
        let query = Query::new()
            .from("orders")
            .columns(&["customer_id", "SUM(total) AS total"])
            .where_clause("status = @status")
            .group_by("customer_id")
            .having("SUM(total) > @min")
            .order_by("total DESC");
        assert_eq!(
            generate(&query, Some("DISTINCT")),
            "SELECT DISTINCT customer_id, SUM(total) AS total FROM orders \
             WHERE status = @status GROUP BY customer_id HAVING SUM(total) > @min \
             ORDER BY total DESC"
        );
    }

    #[test]
    fn test_select_single_row() {
        let query = Query::new().from("users").where_clause("email = @email");
        assert_eq!(
            generate(&query, Some("TOP 1")),
            "SELECT TOP 1 * FROM users WHERE email = @email"
        );
    }
}
