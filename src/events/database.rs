//! Backlog database conversation.
//!
//! A [`DatabaseQuery`] carries a batch of [`Query`] values and the queue that wants
//! the answer. The store replies with exactly one [`DatabaseResult`] per batch.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DatabaseEvent, Event, EventRef, EventType};
use crate::queue::EventQueue;

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// One statement in a query batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Query {
    CreateTable {
        table: String,
        columns: Vec<String>,
    },
    Insert {
        table: String,
        values: Vec<Value>,
    },
    /// Empty `columns` selects every column.
    Select {
        table: String,
        columns: Vec<String>,
        #[serde(default)]
        filters: Vec<Filter>,
    },
    Delete {
        table: String,
        #[serde(default)]
        filters: Vec<Filter>,
    },
}

/// A batch of queries addressed to the backlog store.
#[derive(Debug, Clone)]
pub struct DatabaseQuery {
    /// Where the result goes.
    pub target: EventQueue,
    /// Event that triggered the query, echoed back in the result.
    pub origin: Option<EventRef>,
    pub queries: Vec<Query>,
}

impl DatabaseQuery {
    pub fn new(target: EventQueue, queries: Vec<Query>) -> Self {
        Self {
            target,
            origin: None,
            queries,
        }
    }

    pub fn with_origin(mut self, origin: EventRef) -> Self {
        self.origin = Some(origin);
        self
    }
}

impl Event for DatabaseQuery {
    fn event_type(&self) -> EventType {
        EventType::DatabaseQuery
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_database_event(&self) -> Option<&dyn DatabaseEvent> {
        Some(self)
    }
}

impl DatabaseEvent for DatabaseQuery {
    fn origin(&self) -> Option<&EventRef> {
        self.origin.as_ref()
    }
}

/// Answer to a [`DatabaseQuery`]. `columns`/`rows` hold the last select of the batch.
#[derive(Debug, Clone)]
pub struct DatabaseResult {
    pub origin: Option<EventRef>,
    pub success: bool,
    pub error: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl DatabaseResult {
    pub fn ok(origin: Option<EventRef>, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            origin,
            success: true,
            error: None,
            columns,
            rows,
        }
    }

    pub fn failed(origin: Option<EventRef>, error: impl Into<String>) -> Self {
        Self {
            origin,
            success: false,
            error: Some(error.into()),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }
}

impl Event for DatabaseResult {
    fn event_type(&self) -> EventType {
        EventType::DatabaseResult
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_database_event(&self) -> Option<&dyn DatabaseEvent> {
        Some(self)
    }
}

impl DatabaseEvent for DatabaseResult {
    fn origin(&self) -> Option<&EventRef> {
        self.origin.as_ref()
    }
}
