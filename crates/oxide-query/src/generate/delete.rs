//! DELETE generation.

use super::{predicate, source};
use crate::query::Query;

pub(super) fn generate(query: &Query) -> String {
    let mut sql = String::from("DELETE FROM ");
    sql.push_str(source(query));
    sql.push_str(" WHERE ");
    sql.push_str(predicate(query));
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete() {
        let query = Query::new().from("users").where_clause("id = @id");
        assert_eq!(generate(&query), "DELETE FROM users WHERE id = @id");
    }
}
