#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use oxide_query::{
    Command, Connect, Connection, Cursor, DriverError, Execution, ParamValue, Session, Settings,
    SqlValue,
};

/// Installs a test subscriber so traces show up in failing test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// One scripted result set.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| String::from(*c)).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        assert_eq!(values.len(), self.columns.len(), "row width mismatch");
        self.rows.push(values);
        self
    }
}

/// Scripted reply to the next statement.
#[derive(Debug, Clone)]
pub enum Reply {
    Execute(Execution),
    Scalar(SqlValue),
    Sets(Vec<ResultSet>),
    Fail(DriverError),
}

#[derive(Debug, Default)]
pub struct State {
    pub commands: Vec<Command>,
    pub events: Vec<String>,
    pub replies: VecDeque<Reply>,
}

/// In-memory connection that records every command and replays scripted
/// replies in order.
///
/// Clones share state, so a test keeps one handle while the session owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<State>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.state().replies.push_back(reply);
        self
    }

    pub fn rows(&self, set: ResultSet) -> &Self {
        self.reply(Reply::Sets(vec![set]))
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state().commands.clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.state().commands.iter().map(|c| c.text.clone()).collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, event: &str, command: Option<&Command>) -> Option<Reply> {
        let mut state = self.state();
        state.events.push(String::from(event));
        let command = command?;
        state.commands.push(command.clone());
        state.replies.pop_front()
    }
}

/// Rows an unscripted execute reports: the row tuples of a `VALUES` insert,
/// the rows of a table-valued parameter, otherwise zero.
fn default_rows_affected(command: &Command) -> u64 {
    if let Some(table) = command.params.iter().find_map(|p| match p.value() {
        ParamValue::Table(table) => Some(table),
        ParamValue::Scalar(_) => None,
    }) {
        return table.rows.len() as u64;
    }
    match command.text.split_once(" VALUES ") {
        Some((_, values)) => values.matches("), (").count() as u64 + 1,
        None => 0,
    }
}

impl Connection for MockConnection {
    type Cursor<'c>
        = MockCursor
    where
        Self: 'c;

    fn begin(&mut self) -> Result<(), DriverError> {
        self.record("begin", None);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.record("commit", None);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.record("rollback", None);
        Ok(())
    }

    fn execute(&mut self, command: &Command) -> Result<Execution, DriverError> {
        match self.record("execute", Some(command)) {
            Some(Reply::Execute(execution)) => Ok(execution),
            Some(Reply::Fail(err)) => Err(err),
            _ => Ok(Execution::new(default_rows_affected(command))),
        }
    }

    fn scalar(&mut self, command: &Command) -> Result<SqlValue, DriverError> {
        match self.record("scalar", Some(command)) {
            Some(Reply::Scalar(value)) => Ok(value),
            Some(Reply::Fail(err)) => Err(err),
            _ => Ok(SqlValue::Null),
        }
    }

    fn query(&mut self, command: &Command) -> Result<Self::Cursor<'_>, DriverError> {
        match self.record("query", Some(command)) {
            Some(Reply::Sets(sets)) => Ok(MockCursor::new(sets)),
            Some(Reply::Fail(err)) => Err(err),
            _ => Ok(MockCursor::new(vec![ResultSet::default()])),
        }
    }
}

/// Cursor over scripted result sets.
#[derive(Debug)]
pub struct MockCursor {
    sets: Vec<ResultSet>,
    set: usize,
    row: Option<usize>,
}

impl MockCursor {
    pub fn new(sets: Vec<ResultSet>) -> Self {
        Self {
            sets,
            set: 0,
            row: None,
        }
    }

    fn current_set(&self) -> Option<&ResultSet> {
        self.sets.get(self.set)
    }

    fn current_row(&self) -> Option<&Vec<SqlValue>> {
        self.current_set()?.rows.get(self.row?)
    }
}

impl Cursor for MockCursor {
    fn column_count(&self) -> usize {
        self.current_set().map_or(0, |s| s.columns.len())
    }

    fn column_name(&self, index: usize) -> &str {
        self.current_set()
            .and_then(|s| s.columns.get(index))
            .map_or("", String::as_str)
    }

    fn is_null(&self, index: usize) -> bool {
        self.current_row()
            .and_then(|r| r.get(index))
            .map_or(true, SqlValue::is_null)
    }

    fn value(&self, index: usize) -> Result<SqlValue, DriverError> {
        self.current_row()
            .and_then(|r| r.get(index))
            .cloned()
            .ok_or_else(|| DriverError::new(format!("no value at column {index}")))
    }

    fn next_row(&mut self) -> Result<bool, DriverError> {
        let len = self.current_set().map_or(0, |s| s.rows.len());
        let next = self.row.map_or(0, |r| r + 1);
        if next < len {
            self.row = Some(next);
            Ok(true)
        } else {
            self.row = Some(len);
            Ok(false)
        }
    }

    fn next_result(&mut self) -> Result<bool, DriverError> {
        if self.set + 1 < self.sets.len() {
            self.set += 1;
            self.row = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Connector handing out clones of one mock connection.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub connection: MockConnection,
    pub refuse: bool,
}

impl Connect for MockConnector {
    type Connection = MockConnection;

    fn connect(&self, connection_string: &str) -> Result<MockConnection, DriverError> {
        if self.refuse {
            return Err(DriverError::with_code(18456, "Login failed"));
        }
        self.connection
            .record(&format!("connect {connection_string}"), None);
        Ok(self.connection.clone())
    }
}

/// A session over a fresh mock with sniffing disabled, plus a handle on the
/// mock for assertions.
pub fn session() -> (Session<MockConnection>, MockConnection) {
    session_with(Settings::new("Server=mock").with_anti_sniffing(false))
}

pub fn session_with(settings: Settings) -> (Session<MockConnection>, MockConnection) {
    init_tracing();
    let connection = MockConnection::new();
    (Session::new(connection.clone(), settings), connection)
}

pub fn int(n: i64) -> SqlValue {
    SqlValue::Int(n)
}

pub fn text(s: &str) -> SqlValue {
    SqlValue::Text(String::from(s))
}
