use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Classified failure codes of the remote document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteErrorKind {
    Unavailable,
    DeadlineExceeded,
    PermissionDenied,
    NotFound,
    FailedPrecondition,
    Other,
}

impl RemoteErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            RemoteErrorKind::Unavailable => "unavailable",
            RemoteErrorKind::DeadlineExceeded => "deadline-exceeded",
            RemoteErrorKind::PermissionDenied => "permission-denied",
            RemoteErrorKind::NotFound => "not-found",
            RemoteErrorKind::FailedPrecondition => "failed-precondition",
            RemoteErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{} ({})", message, kind.code())]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unavailable, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::DeadlineExceeded, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::PermissionDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::FailedPrecondition, message)
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::Unavailable | RemoteErrorKind::DeadlineExceeded
        )
    }
}

/// A document snapshot: the remote id plus its JSON object fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Value) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// Typed view of the fields, with the document id injected under `id`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut fields = self.fields.clone();
        if let Some(map) = fields.as_object_mut() {
            map.entry("id")
                .or_insert_with(|| Value::String(self.id.clone()));
        }
        serde_json::from_value(fields)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryFilter {
    Eq { field: String, value: Value },
    /// Inclusive range over a field, string- or number-ordered.
    Range { field: String, start: Value, end: Value },
}

impl QueryFilter {
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        QueryFilter::Eq {
            field: field.into(),
            value,
        }
    }

    /// Case-sensitive prefix match over a string field, expressed as the
    /// range query the remote store supports (`>= prefix, <= prefix + U+F8FF`).
    pub fn prefix(field: impl Into<String>, prefix: &str) -> Self {
        QueryFilter::Range {
            field: field.into(),
            start: Value::String(prefix.to_string()),
            end: Value::String(format!("{prefix}\u{f8ff}")),
        }
    }

    pub fn matches(&self, fields: &Value) -> bool {
        match self {
            QueryFilter::Eq { field, value } => fields.get(field) == Some(value),
            QueryFilter::Range { field, start, end } => match fields.get(field) {
                Some(Value::String(s)) => {
                    let lo = start.as_str().unwrap_or("");
                    let hi = end.as_str().unwrap_or("");
                    s.as_str() >= lo && s.as_str() <= hi
                }
                Some(Value::Number(n)) => {
                    let v = n.as_f64().unwrap_or(f64::NAN);
                    let lo = start.as_f64().unwrap_or(f64::NEG_INFINITY);
                    let hi = end.as_f64().unwrap_or(f64::INFINITY);
                    v >= lo && v <= hi
                }
                _ => false,
            },
        }
    }
}

/// Commit-time guard: the transaction applies only if the named field still
/// holds the value the caller read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGuard {
    pub field: String,
    pub expected: Value,
}

impl FieldGuard {
    pub fn new(field: impl Into<String>, expected: Value) -> Self {
        Self {
            field: field.into(),
            expected,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteStep {
    Create {
        collection: String,
        fields: Value,
    },
    Update {
        collection: String,
        id: String,
        fields: Value,
        guards: Vec<FieldGuard>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

pub type SnapshotEvent = Result<Vec<Document>, RemoteError>;

/// Live query handle. Dropping it unsubscribes.
pub struct LiveSubscription {
    rx: mpsc::UnboundedReceiver<SnapshotEvent>,
}

impl LiveSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<SnapshotEvent>) -> Self {
        Self { rx }
    }

    /// Next snapshot or error; `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.rx.recv().await
    }
}

/// Boundary over the managed document database. Implementations must make
/// `transactional_write` all-or-nothing, including its field guards.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Subscribes to a filtered collection; emits an initial snapshot and one
    /// per subsequent change.
    async fn live_query(
        &self,
        collection: &str,
        filters: &[QueryFilter],
    ) -> Result<LiveSubscription, RemoteError>;

    /// One-shot filtered read.
    async fn query_once(
        &self,
        collection: &str,
        filters: &[QueryFilter],
    ) -> Result<Vec<Document>, RemoteError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError>;

    /// Applies every step or none; returns the id of the first created
    /// document, or the first step's target id when nothing is created.
    async fn transactional_write(&self, steps: Vec<WriteStep>) -> Result<String, RemoteError>;

    async fn simple_write(&self, collection: &str, fields: Value) -> Result<String, RemoteError>;

    /// Upsert-merge under a caller-chosen id (fixed-id documents such as
    /// settings).
    async fn simple_set(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), RemoteError>;

    /// Merge into an existing document; `not-found` if it does not exist.
    async fn simple_update(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), RemoteError>;

    async fn simple_delete(&self, collection: &str, id: &str) -> Result<(), RemoteError>;
}
