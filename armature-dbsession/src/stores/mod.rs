//! Record store backends
//!
//! The session handler talks to persisted rows through [`RecordStore`]:
//!
//! - **Memory**: rows kept in process, for tests and single-process setups
//! - **SeaORM**: one relational row per session (`seaorm` feature)

mod memory;
#[cfg(feature = "seaorm")]
pub mod seaorm;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryRecordStore;
#[cfg(feature = "seaorm")]
pub use self::seaorm::SeaOrmRecordStore;

use crate::error::{SessionError, SessionResult};
use crate::record::SessionRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::cmp::Ordering;
use std::fmt;

/// Filterable column of a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// External session identifier (text)
    SessionId,
    /// Creation time (timestamp)
    CreatedOn,
    /// Last update time (timestamp)
    UpdatedOn,
}

impl Field {
    /// Whether `value` has the type stored in this column.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (Field::SessionId, FieldValue::Text(_))
                | (Field::CreatedOn | Field::UpdatedOn, FieldValue::Timestamp(_))
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::SessionId => write!(f, "session_id"),
            Field::CreatedOn => write!(f, "created_on"),
            Field::UpdatedOn => write!(f, "updated_on"),
        }
    }
}

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Value compared against a [`Field`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Text value
    Text(String),
    /// Timestamp value
    Timestamp(DateTime<Utc>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

/// A single `field op value` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Column to compare
    pub field: Field,
    /// Comparison
    pub op: CompareOp,
    /// Right-hand side
    pub value: FieldValue,
}

impl Condition {
    /// Build a condition, rejecting values of the wrong type for the column.
    pub fn new(field: Field, op: CompareOp, value: FieldValue) -> SessionResult<Self> {
        if !field.accepts(&value) {
            return Err(SessionError::Store(format!(
                "cannot compare {} with {:?}",
                field, value
            )));
        }
        Ok(Self { field, op, value })
    }

    /// Exact-match condition.
    pub fn exact(field: Field, value: FieldValue) -> SessionResult<Self> {
        Self::new(field, CompareOp::Eq, value)
    }

    /// Evaluate the condition against a record held in memory.
    pub fn matches(&self, record: &SessionRecord) -> bool {
        let ordering = match (&self.field, &self.value) {
            (Field::SessionId, FieldValue::Text(v)) => record.session_id.as_str().cmp(v.as_str()),
            (Field::CreatedOn, FieldValue::Timestamp(v)) => record.created_on.cmp(v),
            (Field::UpdatedOn, FieldValue::Timestamp(v)) => record.updated_on.cmp(v),
            _ => return false,
        };
        self.op.holds(ordering)
    }
}

/// Trait for session row storage backends.
///
/// Each operation is atomic on its own row; nothing spans rows. Implementations
/// must be safe to share between many concurrently running handlers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load the first row whose `field` equals `value` exactly.
    async fn find_one_by(
        &self,
        field: Field,
        value: FieldValue,
    ) -> SessionResult<Option<SessionRecord>>;

    /// Insert a new row and return it with its assigned `id`.
    async fn save_new(&self, record: SessionRecord) -> SessionResult<SessionRecord>;

    /// Overwrite `session_id`, `data` and `updated_on` of a persisted row.
    /// Updating a row that no longer exists is a no-op.
    async fn update(&self, record: &SessionRecord) -> SessionResult<()>;

    /// Delete a persisted row. Deleting a row that is already gone succeeds.
    async fn delete(&self, record: &SessionRecord) -> SessionResult<()>;

    /// Lazily stream every row matching `field op value`, in `id` order.
    ///
    /// The stream is finite and single pass, and tolerates rows being deleted
    /// while it is consumed.
    fn iterate_where(
        &self,
        field: Field,
        op: CompareOp,
        value: FieldValue,
    ) -> BoxStream<'_, SessionResult<SessionRecord>>;

    /// Number of stored rows.
    async fn count(&self) -> SessionResult<usize>;

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}

/// Surrogate key of a record that must already be persisted.
pub(crate) fn persisted_id(record: &SessionRecord) -> SessionResult<i64> {
    record.id.ok_or_else(|| {
        SessionError::Store(format!(
            "session '{}' has not been saved yet",
            record.session_id
        ))
    })
}
