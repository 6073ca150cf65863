//! Statement execution inside a workspace
//!
//! A [`Session`] is one connection as the workspace role. Every statement runs
//! under the server-side `statement_timeout` of the role plus a client-side
//! deadline that cancels the query if the server does not.

mod cells;
mod errors;

pub use errors::classify;

use std::future::Future;
use std::time::Duration;
use futures_util::{pin_mut, TryStreamExt};
use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use sql_judge_core::compare::CallResult;
use sql_judge_core::sql::{split_script, Statement};
use sql_judge_core::{Cell, Column, DatabaseSnapshot, Failure, Phase, ResourceCaps, ResultTable};
use crate::workspace::quote_ident;

/// Extra time the client waits past `statement_timeout` before cancelling
const CANCEL_GRACE: Duration = Duration::from_millis(500);

/// How long `close` waits for the connection task to finish
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Wrap a whole text as a single statement
pub fn whole(text: &str) -> Statement {
    Statement {
        text: text.to_string(),
        start: 0,
        end: text.chars().count(),
    }
}

/// A connection as a workspace role
pub struct Session {
    client: Client,
    connection: JoinHandle<()>,
    caps: ResourceCaps,
}

impl Session {
    /// Connect with the given settings
    pub async fn open(config: &tokio_postgres::Config, caps: ResourceCaps) -> Result<Self, Failure> {
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| Failure::engine(Phase::OpenUser, e.to_string()))?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Workspace connection ended: {}", e);
            }
        });

        Ok(Session { client, connection, caps })
    }

    /// Resource caps of this session
    pub fn caps(&self) -> &ResourceCaps {
        &self.caps
    }

    async fn cancel(&self) {
        if let Err(e) = self.client.cancel_token().cancel_query(NoTls).await {
            warn!("Failed to cancel a running statement: {}", e);
        }
    }

    async fn with_deadline<T, F>(&self, phase: Phase, operation: F) -> Result<T, Failure>
    where
        F: Future<Output = Result<T, Failure>>,
    {
        match tokio::time::timeout(self.caps.stmt_timeout() + CANCEL_GRACE, operation).await {
            Ok(result) => result,
            Err(_) => {
                self.cancel().await;
                Err(Failure::timeout(
                    phase,
                    format!("statement did not finish within {:?}", self.caps.stmt_timeout()),
                ))
            }
        }
    }

    /// Run one statement, discarding any rows
    pub async fn execute(&self, phase: Phase, source: &str, statement: &Statement) -> Result<(), Failure> {
        self.with_deadline(phase, async {
            self.client
                .batch_execute(&statement.text)
                .await
                .map_err(|e| classify(&e, phase, source, Some(statement)))
        })
        .await
        .map_err(|failure| failure.with_statement(statement.trimmed()))
    }

    /// Run prepared statements in order, stopping at the first failure
    pub async fn run_statements(&self, phase: Phase, source: &str, statements: &[Statement]) -> Result<(), Failure> {
        for statement in statements {
            self.execute(phase, source, statement).await?;
        }
        Ok(())
    }

    /// Split a trusted script and run it statement by statement
    pub async fn run_script(&self, phase: Phase, script: &str) -> Result<(), Failure> {
        let statements = split_script(script);
        debug!("Running {} statement(s) in phase {}", statements.len(), phase);
        self.run_statements(phase, script, &statements).await
    }

    /// Run statements in one transaction, committing only if all succeed
    pub async fn run_transaction(&self, phase: Phase, source: &str, statements: &[Statement]) -> Result<(), Failure> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| Failure::engine(phase, e.to_string()))?;

        if let Err(failure) = self.run_statements(phase, source, statements).await {
            if let Err(e) = self.client.batch_execute("ROLLBACK").await {
                debug!("Rollback after a failed statement did not complete: {}", e);
            }
            return Err(failure);
        }

        let commit = whole("COMMIT");
        self.execute(phase, "COMMIT", &commit).await
    }

    /// Run a query and materialize its result within the row and column caps
    pub async fn query_table(&self, phase: Phase, source: &str, statement: &Statement) -> Result<ResultTable, Failure> {
        let caps = &self.caps;
        self.with_deadline(phase, async {
            let prepared = self
                .client
                .prepare(&statement.text)
                .await
                .map_err(|e| classify(&e, phase, source, Some(statement)))?;

            let columns = prepared.columns();
            if columns.len() > caps.max_cols {
                return Err(Failure::limit_exceeded(
                    phase,
                    format!("result has {} columns, the limit is {}", columns.len(), caps.max_cols),
                ));
            }
            let header: Vec<Column> = columns
                .iter()
                .map(|c| Column::new(c.name(), c.type_().name()))
                .collect();

            let params: [&(dyn ToSql + Sync); 0] = [];
            let stream = self
                .client
                .query_raw(&prepared, params)
                .await
                .map_err(|e| classify(&e, phase, source, Some(statement)))?;
            pin_mut!(stream);

            let mut rows = Vec::new();
            while let Some(row) = stream
                .try_next()
                .await
                .map_err(|e| classify(&e, phase, source, Some(statement)))?
            {
                if rows.len() == caps.max_rows {
                    return Err(Failure::limit_exceeded(
                        phase,
                        format!("result has more than {} rows", caps.max_rows),
                    ));
                }
                let cells = cells::decode_row(&row).map_err(|e| Failure::engine(phase, e.to_string()))?;
                rows.push(cells);
            }

            Ok(ResultTable::new(header, rows))
        })
        .await
        .map_err(|failure| failure.with_statement(statement.trimmed()))
    }

    /// Read every table the workspace role owns
    pub async fn snapshot(&self, phase: Phase) -> Result<DatabaseSnapshot, Failure> {
        let listing = whole(
            "SELECT schemaname::text, tablename::text FROM pg_tables \
             WHERE tableowner = current_user ORDER BY tablename",
        );
        let tables = self.query_table(phase, &listing.text, &listing).await?;
        if tables.row_count() > self.caps.max_tables {
            return Err(Failure::limit_exceeded(
                phase,
                format!("{} tables exist, the limit is {}", tables.row_count(), self.caps.max_tables),
            ));
        }

        let mut snapshot = DatabaseSnapshot::new();
        for row in &tables.rows {
            let (schema, table) = match (&row[0], &row[1]) {
                (Cell::Text(schema), Cell::Text(table)) => (schema, table),
                other => return Err(Failure::engine(phase, format!("unexpected table listing row {:?}", other))),
            };
            let select = whole(&format!("SELECT * FROM {}.{}", quote_ident(schema), quote_ident(table)));
            let contents = self.query_table(phase, &select.text, &select).await?;
            snapshot.insert(table.clone(), contents);
        }
        Ok(snapshot)
    }

    /// Evaluate a scalar expression with `SELECT <call>`
    pub async fn call_function(&self, phase: Phase, call: &str) -> Result<CallResult, Failure> {
        let select = whole(&format!("SELECT {}", call.trim().trim_end_matches(';')));
        let table = self.query_table(phase, &select.text, &select).await?;

        let type_tag = table
            .header
            .first()
            .map(|c| c.type_tag.clone())
            .unwrap_or_default();
        let value = table
            .rows
            .first()
            .and_then(|row| row.first())
            .cloned()
            .unwrap_or(Cell::Null);
        Ok(CallResult::new(call.trim(), value, type_tag))
    }

    /// Create stored objects; any failure is a compile failure
    pub async fn compile(&self, source: &str, statements: &[Statement]) -> Result<(), Failure> {
        self.run_statements(Phase::Compile, source, statements).await
    }

    /// Close the connection and wait briefly for its task
    pub async fn close(self) {
        drop(self.client);
        if tokio::time::timeout(CLOSE_TIMEOUT, self.connection).await.is_err() {
            debug!("Workspace connection task did not finish in time");
        }
    }
}
