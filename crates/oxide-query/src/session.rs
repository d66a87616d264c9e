//! Session: one connection, an optional transaction and the executor.
//!
//! Every result method takes a `Query`, resolves it for the matching
//! `OperationKind` and shapes what the driver returns. Methods returning a
//! cursor or a lazy row iterator borrow the session mutably, so no other
//! statement can be issued until the cursor is dropped.
//!
//! # Example
//!
//! ```ignore
//! use oxide_query::{Query, Record, Session, Settings};
//!
//! let mut session = Session::open(&connector, Settings::new("Server=db;Database=app"))?;
//!
//! let open: Vec<Record> = session.rows(
//!     Query::new()
//!         .from("orders")
//!         .where_clause("status = @status")
//!         .bind("status", "open")
//!         .order_by("created_at"),
//! )?;
//!
//! session.transaction(|s| {
//!     s.update(
//!         Query::new()
//!             .from("orders")
//!             .set("status", "closed")
//!             .where_clause("id = @id")
//!             .bind("id", 42),
//!     )
//! })?;
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::driver::{
    Command, Connect, Connection, Cursor, Execution, InferredTableEncoder, TableValuedEncoder,
};
use crate::error::Result;
use crate::generate::IDENTITY_PARAM;
use crate::mapping::FromRecord;
use crate::query::{OperationKind, Prepared, Query};
use crate::record::{column_names, read_result_set, read_row, Record};
use crate::value::{FromSqlValue, SqlValue};

/// A connection with its settings and transaction state.
///
/// Dropping a session with an open transaction rolls the transaction back.
pub struct Session<C: Connection> {
    connection: C,
    settings: Settings,
    encoder: Box<dyn TableValuedEncoder>,
    in_transaction: bool,
}

impl<C: Connection> Session<C> {
    /// Opens a connection with `settings.connection_string`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Database` if the connection cannot be opened.
    pub fn open<P>(connector: &P, settings: Settings) -> Result<Self>
    where
        P: Connect<Connection = C>,
    {
        let connection = connector.connect(&settings.connection_string)?;
        debug!(timeout = settings.command_timeout, "Connection opened");
        Ok(Self::new(connection, settings))
    }

    /// Wraps an already open connection.
    #[must_use]
    pub fn new(connection: C, settings: Settings) -> Self {
        Self {
            connection,
            settings,
            encoder: Box::new(InferredTableEncoder),
            in_transaction: false,
        }
    }

    /// Replaces the encoder used for table-valued inserts.
    #[must_use]
    pub fn with_encoder(mut self, encoder: impl TableValuedEncoder + 'static) -> Self {
        self.encoder = Box::new(encoder);
        self
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &C {
        &self.connection
    }

    /// Returns the underlying connection mutably.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    // Transactions

    /// Begins a transaction.
    ///
    /// Transactions do not nest: an open transaction is rolled back first.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Database` if the driver fails.
    pub fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            warn!("Transaction already open, rolling it back");
            self.in_transaction = false;
            self.connection.rollback()?;
        }
        self.connection.begin()?;
        self.in_transaction = true;
        debug!("Transaction started");
        Ok(())
    }

    /// Commits the open transaction. Does nothing when none is open.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Database` if the driver fails.
    pub fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.connection.commit()?;
        info!("Transaction committed");
        Ok(())
    }

    /// Rolls back the open transaction. Does nothing when none is open.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Database` if the driver fails.
    pub fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.connection.rollback()?;
        warn!("Transaction rolled back");
        Ok(())
    }

    /// Runs `f` in a transaction, committing on `Ok` and rolling back on
    /// `Err`.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or the driver error of begin or commit.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!(error = %rollback_err, "Rollback after failure failed");
                }
                Err(err)
            }
        }
    }

    // Statement plumbing

    fn prepare(&self, query: Query, kind: OperationKind) -> Result<Command> {
        let mut prepared = query.finalize(kind)?;
        prepared.command_with(&self.settings, self.encoder.as_ref())
    }

    fn run(&mut self, kind: OperationKind, command: &Command) -> Result<Execution> {
        log_command(kind, command);
        Ok(self.connection.execute(command)?)
    }

    fn run_scalar<T>(&mut self, query: Query, kind: OperationKind) -> Result<T>
    where
        T: FromSqlValue + Default,
    {
        let command = self.prepare(query, kind)?;
        log_command(kind, &command);
        let value = self.connection.scalar(&command)?;
        from_nullable(value)
    }

    fn open_cursor(&mut self, query: Query, kind: OperationKind) -> Result<C::Cursor<'_>> {
        let command = self.prepare(query, kind)?;
        log_command(kind, &command);
        Ok(self.connection.query(&command)?)
    }

    /// Runs an already generated command as a non-query.
    ///
    /// Pairs with `Prepared::next_statement` for driving batches by hand.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Database` if the driver fails.
    pub fn execute_command(&mut self, command: &Command) -> Result<Execution> {
        self.run(OperationKind::Execute, command)
    }

    // Result shapes

    /// Runs the query and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an illegal clause set, or the driver
    /// error.
    pub fn execute(&mut self, query: Query) -> Result<u64> {
        let command = self.prepare(query, OperationKind::Execute)?;
        Ok(self.run(OperationKind::Execute, &command)?.rows_affected)
    }

    /// Runs the query and converts the first column of the first row.
    ///
    /// `NULL` and an empty result read as `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns a configuration, driver or conversion error.
    pub fn scalar<T: FromSqlValue + Default>(&mut self, query: Query) -> Result<T> {
        self.run_scalar(query, OperationKind::Scalar)
    }

    /// Counts the rows the query matches.
    ///
    /// # Errors
    ///
    /// Returns a configuration, driver or conversion error.
    pub fn count(&mut self, query: Query) -> Result<i64> {
        self.run_scalar(query, OperationKind::Count)
    }

    /// Returns the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns a configuration or driver error.
    pub fn item(&mut self, query: Query) -> Result<Option<Record>> {
        let mut cursor = self.open_cursor(query, OperationKind::Item)?;
        let columns = column_names(&cursor);
        if cursor.next_row()? {
            Ok(Some(read_row(&cursor, &columns)?))
        } else {
            Ok(None)
        }
    }

    /// Returns the first row mapped to `T`, if any.
    ///
    /// # Errors
    ///
    /// See [`Session::item`].
    pub fn item_as<T: FromRecord>(&mut self, query: Query) -> Result<Option<T>> {
        Ok(self.item(query)?.as_ref().map(T::from_record))
    }

    /// Returns every row of the first result set.
    ///
    /// # Errors
    ///
    /// Returns a configuration or driver error.
    pub fn rows(&mut self, query: Query) -> Result<Vec<Record>> {
        let mut cursor = self.open_cursor(query, OperationKind::Rows)?;
        read_result_set(&mut cursor)
    }

    /// Returns every row of the first result set mapped to `T`.
    ///
    /// # Errors
    ///
    /// See [`Session::rows`].
    pub fn rows_as<T: FromRecord>(&mut self, query: Query) -> Result<Vec<T>> {
        Ok(T::from_records(&self.rows(query)?))
    }

    /// Returns one zero-based page of rows.
    ///
    /// Each row carries the `__row` number column.
    ///
    /// # Errors
    ///
    /// Returns a configuration or driver error.
    pub fn page(&mut self, query: Query) -> Result<Vec<Record>> {
        let mut cursor = self.open_cursor(query, OperationKind::Page)?;
        read_result_set(&mut cursor)
    }

    /// Returns the rows lazily.
    ///
    /// The iterator holds the connection; drain or drop it before issuing
    /// another statement.
    ///
    /// # Errors
    ///
    /// Returns a configuration or driver error. Errors while reading rows are
    /// yielded by the iterator.
    pub fn iter(&mut self, query: Query) -> Result<RowIter<C::Cursor<'_>>> {
        let cursor = self.open_cursor(query, OperationKind::Iter)?;
        Ok(RowIter::new(cursor))
    }

    /// Returns the open cursor for the caller to consume.
    ///
    /// # Errors
    ///
    /// Returns a configuration or driver error.
    pub fn reader(&mut self, query: Query) -> Result<C::Cursor<'_>> {
        self.open_cursor(query, OperationKind::Reader)
    }

    /// Returns the rows of every result set, in order.
    ///
    /// # Errors
    ///
    /// Returns a configuration or driver error.
    pub fn multiple(&mut self, query: Query) -> Result<Vec<Vec<Record>>> {
        let mut cursor = self.open_cursor(query, OperationKind::Multiple)?;
        let mut sets = vec![read_result_set(&mut cursor)?];
        while cursor.next_result()? {
            sets.push(read_result_set(&mut cursor)?);
        }
        Ok(sets)
    }

    /// Inserts one row and returns its identity, or 0 when the table has
    /// no identity column.
    ///
    /// # Errors
    ///
    /// Returns a configuration, driver or conversion error.
    pub fn insert(&mut self, query: Query) -> Result<i64> {
        let command = self.prepare(query, OperationKind::Insert)?;
        let execution = self.run(OperationKind::Insert, &command)?;
        match execution.output(IDENTITY_PARAM) {
            Some(value) => from_nullable(value.clone()),
            None => Ok(0),
        }
    }

    /// Inserts every row, one statement per batch, and returns the total
    /// number of affected rows.
    ///
    /// Batches already executed stay applied when a later one fails; run
    /// the insert in a transaction for all-or-nothing behavior.
    ///
    /// # Errors
    ///
    /// Returns a configuration or driver error.
    pub fn insert_batch(&mut self, query: Query) -> Result<u64> {
        let mut prepared = query.finalize(OperationKind::InsertBatch)?;
        let mut total = 0;
        let mut statements = 0_usize;
        while let Some(command) = self.next_statement(&mut prepared)? {
            total += self.run(OperationKind::InsertBatch, &command)?.rows_affected;
            statements += 1;
        }
        debug!(rows = total, statements, "Batch insert finished");
        Ok(total)
    }

    fn next_statement(&self, prepared: &mut Prepared) -> Result<Option<Command>> {
        prepared.next_statement(&self.settings, self.encoder.as_ref())
    }

    /// Updates the matching rows and returns how many were affected.
    ///
    /// # Errors
    ///
    /// Returns a configuration or driver error.
    pub fn update(&mut self, query: Query) -> Result<u64> {
        let command = self.prepare(query, OperationKind::Update)?;
        Ok(self.run(OperationKind::Update, &command)?.rows_affected)
    }

    /// Deletes the matching rows and returns how many were affected.
    ///
    /// # Errors
    ///
    /// Returns a configuration or driver error.
    pub fn delete(&mut self, query: Query) -> Result<u64> {
        let command = self.prepare(query, OperationKind::Delete)?;
        Ok(self.run(OperationKind::Delete, &command)?.rows_affected)
    }
}

impl<C: Connection> Drop for Session<C> {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!("Session dropped with an open transaction, rolling back");
            if let Err(err) = self.connection.rollback() {
                warn!(error = %err, "Rollback on drop failed");
            }
        }
    }
}

fn log_command(kind: OperationKind, command: &Command) {
    debug!(
        kind = %kind,
        sql = %command.text,
        params = command.params.len(),
        "Executing statement"
    );
}

fn from_nullable<T: FromSqlValue + Default>(value: SqlValue) -> Result<T> {
    if value.is_null() {
        Ok(T::default())
    } else {
        T::from_sql_value(value)
    }
}

/// Lazily reads the rows of a cursor's current result set.
pub struct RowIter<K: Cursor> {
    cursor: K,
    columns: Arc<Vec<String>>,
    done: bool,
}

impl<K: Cursor> RowIter<K> {
    fn new(cursor: K) -> Self {
        let columns = column_names(&cursor);
        Self {
            cursor,
            columns,
            done: false,
        }
    }

    /// Returns the disambiguated column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl<K: Cursor> Iterator for RowIter<K> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.next_row() {
            Ok(true) => Some(read_row(&self.cursor, &self.columns)),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err.into()))
            }
        }
    }
}
