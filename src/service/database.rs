//! In-memory backlog store.
//!
//! Answers [`DatabaseQuery`] batches with one [`DatabaseResult`] each. A batch is
//! applied all-or-nothing: if any statement fails, no table changes and the result
//! carries the error. Queries that arrive before `Init` are held back and run in
//! arrival order once `Init` is seen.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::events::{
    DatabaseQuery, DatabaseResult, EventGuard, EventRef, EventType, Filter, Query,
};
use crate::queue::{EventHandler, EventLoop, Flow, Subscription};
use crate::types::{Error, Result};

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    fn column_index(&self, table: &str, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| Error::validation(format!("unknown column {column} in {table}")))
    }

    fn matcher(&self, table: &str, filters: &[Filter]) -> Result<Vec<(usize, Value)>> {
        filters
            .iter()
            .map(|f| Ok((self.column_index(table, &f.column)?, f.value.clone())))
            .collect()
    }
}

fn row_matches(row: &[Value], matcher: &[(usize, Value)]) -> bool {
    matcher.iter().all(|(idx, value)| row.get(*idx) == Some(value))
}

/// Selected columns and rows.
type Selection = (Vec<String>, Vec<Vec<Value>>);

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: HashMap<String, Table>,
    ready: bool,
    held: Vec<EventRef>,
}

impl MemoryDatabase {
    pub const NAME: &'static str = "database";

    pub fn new() -> Self {
        Self::default()
    }

    /// Every database event, plus `Init` and `Quit`.
    pub fn subscription() -> Subscription {
        Subscription::new(
            [EventType::Init, EventType::Quit],
            [EventGuard::database()],
        )
    }

    pub fn build() -> EventLoop {
        EventLoop::new(Self::NAME, Self::subscription(), Self::new())
    }

    fn answer(&mut self, event: &EventRef) {
        let Some(query) = event.downcast_ref::<DatabaseQuery>() else {
            return;
        };
        let result = match self.execute(&query.queries) {
            Ok((columns, rows)) => DatabaseResult::ok(query.origin.clone(), columns, rows),
            Err(err) => {
                tracing::warn!(
                    target_queue = query.target.name(),
                    error = %err,
                    "query batch failed"
                );
                DatabaseResult::failed(query.origin.clone(), err.to_string())
            }
        };
        if let Err(err) = query.target.send_event(Arc::new(result)) {
            tracing::warn!(error = %err, "query target went away");
        }
    }

    /// Run a batch against a copy of the tables and commit it on success.
    fn execute(&mut self, queries: &[Query]) -> Result<Selection> {
        let mut tables = self.tables.clone();
        let mut selection = Selection::default();
        for query in queries {
            if let Some(selected) = run(&mut tables, query)? {
                selection = selected;
            }
        }
        self.tables = tables;
        Ok(selection)
    }
}

fn run(tables: &mut HashMap<String, Table>, query: &Query) -> Result<Option<Selection>> {
    match query {
        Query::CreateTable { table, columns } => {
            if columns.is_empty() {
                return Err(Error::validation(format!("table {table} needs columns")));
            }
            tables.entry(table.clone()).or_insert_with(|| Table {
                columns: columns.clone(),
                rows: Vec::new(),
            });
            Ok(None)
        }
        Query::Insert { table, values } => {
            let target = lookup(tables, table)?;
            if values.len() != target.columns.len() {
                return Err(Error::validation(format!(
                    "{table} has {} columns, got {} values",
                    target.columns.len(),
                    values.len()
                )));
            }
            target.rows.push(values.clone());
            Ok(None)
        }
        Query::Select {
            table,
            columns,
            filters,
        } => {
            let source = lookup(tables, table)?;
            let matcher = source.matcher(table, filters)?;
            let picked: Vec<usize> = if columns.is_empty() {
                (0..source.columns.len()).collect()
            } else {
                columns
                    .iter()
                    .map(|c| source.column_index(table, c))
                    .collect::<Result<Vec<_>>>()?
            };
            let names: Vec<String> = picked.iter().map(|&i| source.columns[i].clone()).collect();
            let rows: Vec<Vec<Value>> = source
                .rows
                .iter()
                .filter(|row| row_matches(row, &matcher))
                .map(|row| picked.iter().map(|&i| row[i].clone()).collect())
                .collect();
            Ok(Some((names, rows)))
        }
        Query::Delete { table, filters } => {
            let target = lookup(tables, table)?;
            let matcher = target.matcher(table, filters)?;
            target.rows.retain(|row| !row_matches(row, &matcher));
            Ok(None)
        }
    }
}

fn lookup<'a>(tables: &'a mut HashMap<String, Table>, table: &str) -> Result<&'a mut Table> {
    tables
        .get_mut(table)
        .ok_or_else(|| Error::not_found(format!("table {table}")))
}

#[async_trait]
impl EventHandler for MemoryDatabase {
    async fn on_event(&mut self, event: EventRef) -> Result<Flow> {
        match event.event_type() {
            EventType::Init => {
                self.ready = true;
                let held = std::mem::take(&mut self.held);
                if !held.is_empty() {
                    tracing::debug!(count = held.len(), "running held-back queries");
                }
                for query in &held {
                    self.answer(query);
                }
            }
            EventType::DatabaseQuery if !self.ready => self.held.push(event),
            EventType::DatabaseQuery => self.answer(&event),
            EventType::Quit => return Ok(Flow::Stop),
            // Results we produced come back through routers; nothing to do.
            _ => {}
        }
        Ok(Flow::Continue)
    }
}
