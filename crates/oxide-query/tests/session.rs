//! Executor tests against the scripted mock driver.

mod common;

use std::time::Duration;

use common::{int, session, session_with, text, MockConnector, Reply, ResultSet};
use oxide_query::{
    CommandKind, Cursor, Direction, DriverError, Execution, ParamValue, Parameter, Query,
    QueryError, Record, Session, Settings, SqlType, SqlValue, TableValue, TableValuedEncoder,
};

// =============================================================================
// Row shapes
// =============================================================================

#[test]
fn test_rows_disambiguates_duplicate_columns() {
    let (mut session, mock) = session();
    mock.rows(
        ResultSet::new(&["id", "name", "id"])
            .row(vec![int(1), text("Alice"), int(10)])
            .row(vec![int(2), SqlValue::Null, int(20)]),
    );

    let rows = session
        .rows(
            Query::new()
                .from("users u JOIN orders o ON o.user_id = u.id")
                .columns(&["u.id", "u.name", "o.id"]),
        )
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].columns().to_vec(), vec!["id", "name", "id1"]);
    assert_eq!(rows[0].get("id"), Some(&int(1)));
    assert_eq!(rows[0].get("id1"), Some(&int(10)));
    assert_eq!(rows[1].get("name"), Some(&SqlValue::Null));
    assert_eq!(
        mock.texts(),
        vec!["SELECT u.id, u.name, o.id FROM users u JOIN orders o ON o.user_id = u.id"]
    );
}

#[test]
fn test_item_returns_first_row_or_none() {
    let (mut session, mock) = session();
    mock.rows(ResultSet::new(&["id", "email"]).row(vec![int(7), text("a@b.c")]));

    let item = session
        .item(
            Query::new()
                .from("users")
                .where_clause("email = @email")
                .bind("email", "a@b.c"),
        )
        .unwrap();
    assert_eq!(item.and_then(|r| r.get_as::<i64>("id").unwrap()), Some(7));

    let missing = session.item(Query::new().from("users")).unwrap();
    assert!(missing.is_none());

    assert_eq!(
        mock.texts(),
        vec![
            "SELECT TOP 1 * FROM users WHERE email = @email",
            "SELECT TOP 1 * FROM users"
        ]
    );
}

#[test]
fn test_page() {
    let (mut session, mock) = session();
    mock.rows(ResultSet::new(&["id", "__row"]).row(vec![int(21), int(21)]));

    let page = session
        .page(
            Query::new()
                .from("users")
                .columns(&["id"])
                .order_by("id")
                .page(2, 10),
        )
        .unwrap();

    assert_eq!(page.len(), 1);
    assert_eq!(page[0].get("__row"), Some(&int(21)));
    assert_eq!(
        mock.texts()[0],
        "SELECT * FROM (SELECT id, ROW_NUMBER() OVER (ORDER BY id) AS __row FROM users) \
         AS __page WHERE __row BETWEEN 21 AND 30 ORDER BY __row"
    );
}

#[test]
fn test_multiple_result_sets() {
    let (mut session, mock) = session();
    mock.reply(Reply::Sets(vec![
        ResultSet::new(&["id"]).row(vec![int(1)]).row(vec![int(2)]),
        ResultSet::new(&["total"]).row(vec![int(3)]),
    ]));

    let sets = session
        .multiple(Query::new().procedure("dbo.Dashboard").bind("user", 1))
        .unwrap();

    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0].len(), 2);
    assert_eq!(sets[1][0].get("total"), Some(&int(3)));
    let commands = mock.commands();
    let command = &commands[0];
    assert_eq!(command.text, "dbo.Dashboard");
    assert_eq!(command.kind, CommandKind::StoredProcedure);
}

#[test]
fn test_iter_reads_lazily() {
    let (mut session, mock) = session();
    mock.rows(
        ResultSet::new(&["n"])
            .row(vec![int(1)])
            .row(vec![int(2)])
            .row(vec![int(3)]),
    );

    let mut total = 0;
    for record in session.iter(Query::new().from("numbers")).unwrap() {
        total += record.unwrap().get_as::<i64>("n").unwrap().unwrap_or_default();
    }
    assert_eq!(total, 6);

    // The connection is free again once the iterator is gone.
    assert_eq!(session.execute(Query::new().sql("TRUNCATE TABLE numbers")).unwrap(), 0);
    assert_eq!(mock.commands().len(), 2);
}

#[test]
fn test_reader_returns_raw_cursor() {
    let (mut session, mock) = session();
    mock.rows(ResultSet::new(&["a", "b"]).row(vec![int(1), text("x")]));

    let mut cursor = session.reader(Query::new().sql("SELECT a, b FROM t")).unwrap();
    assert_eq!(cursor.column_count(), 2);
    assert_eq!(cursor.column_name(1), "b");
    assert!(cursor.next_row().unwrap());
    assert_eq!(cursor.value(1).unwrap(), text("x"));
    assert!(!cursor.next_row().unwrap());
}

// =============================================================================
// Scalars
// =============================================================================

#[test]
fn test_count_and_scalar() {
    let (mut session, mock) = session();
    mock.reply(Reply::Scalar(int(12)));
    mock.reply(Reply::Scalar(SqlValue::Null));

    let count = session
        .count(Query::new().from("users").where_clause("active = 1"))
        .unwrap();
    assert_eq!(count, 12);

    let total: i64 = session
        .scalar(Query::new().sql("SELECT SUM(total) FROM orders"))
        .unwrap();
    assert_eq!(total, 0);

    assert_eq!(mock.texts()[0], "SELECT COUNT(*) FROM users WHERE active = 1");
}

#[test]
fn test_scalar_conversion_error() {
    let (mut session, mock) = session();
    mock.reply(Reply::Scalar(text("abc")));

    let err = session
        .scalar::<i64>(Query::new().sql("SELECT 'abc'"))
        .unwrap_err();
    assert!(matches!(err, QueryError::Conversion { target: "i64", .. }));
}

// =============================================================================
// Inserts
// =============================================================================

#[test]
fn test_insert_returns_identity() {
    let (mut session, mock) = session();
    mock.reply(Reply::Execute(
        Execution::new(1).with_output("__identity", int(42)),
    ));

    let id = session
        .insert(
            Query::new()
                .from("users")
                .values(Record::new().with("name", "Alice")),
        )
        .unwrap();
    assert_eq!(id, 42);

    let commands = mock.commands();
    let command = &commands[0];
    assert_eq!(
        command.text,
        "INSERT INTO users (name) VALUES (@__v0); SET @__identity = SCOPE_IDENTITY()"
    );
    let output = command.param("__identity").unwrap();
    assert_eq!(output.direction(), Direction::Output);
    assert_eq!(output.sql_type(), Some(&SqlType::BigInt));
}

#[test]
fn test_insert_without_identity_returns_zero() {
    let (mut session, mock) = session();
    mock.reply(Reply::Execute(
        Execution::new(1).with_output("__identity", SqlValue::Null),
    ));
    let row = || Record::new().with("code", "A1");

    assert_eq!(session.insert(Query::new().from("codes").values(row())).unwrap(), 0);
    // Unscripted: the driver reports no output value at all.
    assert_eq!(session.insert(Query::new().from("codes").values(row())).unwrap(), 0);
}

#[test]
fn test_single_insert_rejects_several_rows() {
    let (mut session, mock) = session();
    let err = session
        .insert(
            Query::new()
                .from("codes")
                .values(Record::new().with("code", "A1"))
                .values(Record::new().with("code", "A2")),
        )
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(mock.commands().is_empty());
}

#[test]
fn test_batch_insert_splits_under_parameter_ceiling() {
    let (mut session, mock) = session();
    let rows = (0..1500_i64).map(|i| {
        Record::new()
            .with("id", i)
            .with("code", format!("c{i}"))
            .with("score", 1_000_000 + i)
    });

    let affected = session
        .insert_batch(Query::new().from("scores").rows(rows))
        .unwrap();

    assert_eq!(affected, 1500);
    let counts: Vec<usize> = mock.commands().iter().map(|c| c.params.len()).collect();
    assert_eq!(counts, vec![2097, 2097, 306]);
    assert!(mock.texts()[0]
        .starts_with("INSERT INTO scores (id, code, score) VALUES (@__v0, @__v1, @__v2), ("));
}

#[test]
fn test_batch_insert_splits_on_row_ceiling() {
    let (mut session, mock) = session();
    let rows = (0..2500_i64).map(|i| Record::new().with("n", i));

    let affected = session
        .insert_batch(Query::new().from("numbers").rows(rows))
        .unwrap();

    assert_eq!(affected, 2500);
    let counts: Vec<usize> = mock.commands().iter().map(|c| c.params.len()).collect();
    assert_eq!(counts, vec![1000, 1000, 500]);
}

#[test]
fn test_batch_insert_shares_identical_values() {
    let (mut session, mock) = session();
    let rows = (0..10).map(|_| Record::new().with("status", "new").with("priority", 1));

    let affected = session
        .insert_batch(Query::new().from("tickets").rows(rows))
        .unwrap();

    assert_eq!(affected, 10);
    let commands = mock.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].params.len(), 2);
}

#[test]
fn test_batch_insert_caller_params_share_the_budget() {
    let settings = Settings::new("Server=mock")
        .with_anti_sniffing(false)
        .with_limits(oxide_query::Limits {
            max_parameters: 10,
            max_insert_rows: 1000,
        });
    let (mut session, mock) = session_with(settings);
    let rows = (0..6_i64).map(|i| Record::new().with("a", i).with("b", -i - 1));

    session
        .insert_batch(
            Query::new()
                .from("pairs")
                .rows(rows)
                .bind("unused_a", 1)
                .bind("unused_b", 2),
        )
        .unwrap();

    let counts: Vec<usize> = mock.commands().iter().map(|c| c.params.len()).collect();
    assert_eq!(counts, vec![10, 6]);
}

#[test]
fn test_table_valued_insert_runs_once() {
    let (mut session, mock) = session();
    let rows = (0..5000_i64).map(|i| Record::new().with("id", i).with("name", format!("u{i}")));

    let affected = session
        .insert_batch(
            Query::new()
                .from("users")
                .table_type("dbo.UserRows")
                .rows(rows),
        )
        .unwrap();

    assert_eq!(affected, 5000);
    let commands = mock.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(
        commands[0].text,
        "INSERT INTO users (id, name) SELECT id, name FROM @__rows"
    );
    assert!(commands[0].params[0].is_table());
}

struct FixedEncoder;

impl TableValuedEncoder for FixedEncoder {
    fn encode(
        &self,
        name: &str,
        type_name: &str,
        rows: &[Record],
    ) -> oxide_query::Result<Parameter> {
        Ok(Parameter::table(
            name,
            TableValue {
                type_name: String::from(type_name),
                columns: vec![(String::from("id"), SqlType::Int)],
                rows: rows
                    .iter()
                    .map(|r| vec![r.get("id").cloned().unwrap_or_default()])
                    .collect(),
            },
        ))
    }
}

#[test]
fn test_custom_table_encoder() {
    let (session, mock) = session();
    let mut session = session.with_encoder(FixedEncoder);

    session
        .insert_batch(
            Query::new()
                .from("ids")
                .table_type("dbo.IdList")
                .rows((0..3_i64).map(|i| Record::new().with("id", i))),
        )
        .unwrap();

    let commands = mock.commands();
    let command = &commands[0];
    let ParamValue::Table(table) = command.params[0].value() else {
        panic!("expected a table-valued parameter");
    };
    assert_eq!(table.columns, vec![(String::from("id"), SqlType::Int)]);
    assert_eq!(table.rows.len(), 3);
}

// =============================================================================
// Update / delete
// =============================================================================

#[test]
fn test_update_and_delete() {
    let (mut session, mock) = session();
    mock.reply(Reply::Execute(Execution::new(3)));
    mock.reply(Reply::Execute(Execution::new(1)));

    let updated = session
        .update(
            Query::new()
                .from("users")
                .set("active", false)
                .where_clause("last_login < @cutoff")
                .bind("cutoff", "2024-01-01"),
        )
        .unwrap();
    assert_eq!(updated, 3);

    let deleted = session
        .delete(Query::new().from("users").where_clause("id = @id").bind("id", 9))
        .unwrap();
    assert_eq!(deleted, 1);

    let commands = mock.commands();
    assert_eq!(
        commands[0].text,
        "UPDATE users SET active = @active WHERE last_login < @cutoff"
    );
    let names: Vec<&str> = commands[0].params.iter().map(Parameter::name).collect();
    assert_eq!(names, vec!["cutoff", "active"]);
    assert_eq!(commands[1].text, "DELETE FROM users WHERE id = @id");
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_configuration_errors_reach_no_database() {
    let (mut session, mock) = session();

    let err = session
        .update(Query::new().from("users").where_clause("id = 1"))
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "Update query requires the update values clause");

    let err = session
        .rows(Query::new().sql("SELECT 1").where_clause("x = 1"))
        .unwrap_err();
    assert_eq!(err.to_string(), "Rows query does not allow the where clause");

    let err = session
        .insert_batch(Query::new().from("users"))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "InsertBatch query requires the insert rows clause"
    );

    assert!(mock.commands().is_empty());
}

#[test]
fn test_driver_errors_propagate() {
    let (mut session, mock) = session();
    mock.reply(Reply::Fail(DriverError::with_code(
        2627,
        "Violation of PRIMARY KEY constraint",
    )));

    let err = session
        .insert(Query::new().from("users").values(Record::new().with("id", 1)))
        .unwrap_err();
    match err {
        QueryError::Database(e) => assert_eq!(e.code(), Some(2627)),
        other => panic!("expected a database error, got {other:?}"),
    }
    assert_eq!(mock.commands().len(), 1);
}

#[test]
fn test_failed_batch_stops_the_insert() {
    let (mut session, mock) = session();
    mock.reply(Reply::Execute(Execution::new(1000)));
    mock.reply(Reply::Fail(DriverError::new("timeout expired")));

    let rows = (0..2500_i64).map(|i| Record::new().with("n", i));
    let err = session
        .insert_batch(Query::new().from("numbers").rows(rows))
        .unwrap_err();

    assert!(matches!(err, QueryError::Database(_)));
    assert_eq!(mock.commands().len(), 2);
}

// =============================================================================
// Transactions
// =============================================================================

#[test]
fn test_transaction_commits_on_ok() {
    let (mut session, mock) = session();
    session
        .transaction(|s| s.execute(Query::new().sql("UPDATE a SET b = 1")))
        .unwrap();
    assert_eq!(mock.events(), vec!["begin", "execute", "commit"]);
    assert!(!session.in_transaction());
}

#[test]
fn test_transaction_rolls_back_on_err() {
    let (mut session, mock) = session();
    mock.reply(Reply::Fail(DriverError::new("deadlock victim")));

    let result = session.transaction(|s| s.execute(Query::new().sql("UPDATE a SET b = 1")));

    assert!(result.is_err());
    assert!(!session.in_transaction());
    assert_eq!(mock.events(), vec!["begin", "execute", "rollback"]);
}

#[test]
fn test_begin_discards_open_transaction() {
    let (mut session, mock) = session();
    session.begin().unwrap();
    session.begin().unwrap();
    assert_eq!(mock.events(), vec!["begin", "rollback", "begin"]);

    drop(session);
    assert_eq!(mock.events(), vec!["begin", "rollback", "begin", "rollback"]);
}

#[test]
fn test_commit_without_transaction_is_a_no_op() {
    let (mut session, mock) = session();
    session.commit().unwrap();
    session.rollback().unwrap();
    drop(session);
    assert!(mock.events().is_empty());
}

// =============================================================================
// Settings
// =============================================================================

#[test]
fn test_open_uses_settings() {
    common::init_tracing();
    let connector = MockConnector::default();
    let settings = Settings::new("Server=db;Database=app").with_command_timeout(5);

    let mut session = Session::open(&connector, settings).unwrap();
    session.execute(Query::new().sql("SELECT 1")).unwrap();

    assert_eq!(connector.connection.events()[0], "connect Server=db;Database=app");
    assert_eq!(
        connector.connection.commands()[0].timeout,
        Duration::from_secs(5)
    );
}

#[test]
fn test_open_reports_connection_failure() {
    let connector = MockConnector {
        refuse: true,
        ..MockConnector::default()
    };
    assert!(matches!(
        Session::open(&connector, Settings::default()),
        Err(QueryError::Database(_))
    ));
}

#[test]
fn test_anti_sniffing_rewrites_selects() {
    let (mut session, mock) = session_with(Settings::new("Server=mock"));

    session
        .rows(
            Query::new()
                .from("orders")
                .where_clause("status = @status")
                .bind("status", "open"),
        )
        .unwrap();
    session
        .delete(
            Query::new()
                .from("orders")
                .where_clause("status = @status")
                .bind("status", "void"),
        )
        .unwrap();

    assert_eq!(
        mock.texts(),
        vec![
            "DECLARE @__status NVARCHAR(MAX) = @status;\n\
             SELECT * FROM orders WHERE status = @__status",
            "DELETE FROM orders WHERE status = @status",
        ]
    );
}
