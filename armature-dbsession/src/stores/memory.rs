//! In-memory record store
//!
//! Rows live in a `BTreeMap` keyed by surrogate id behind a tokio `RwLock`.
//! Suitable for tests and single-process deployments; sessions do not
//! survive a restart.

use crate::error::SessionResult;
use crate::record::SessionRecord;
use crate::stores::{CompareOp, Condition, Field, FieldValue, RecordStore, persisted_id};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// In-memory session row store.
pub struct MemoryRecordStore {
    rows: RwLock<BTreeMap<i64, SessionRecord>>,
    next_id: AtomicI64,
}

impl MemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        debug!("Creating new in-memory session record store");
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Snapshot of every stored row, in id order.
    pub async fn rows(&self) -> Vec<SessionRecord> {
        self.rows.read().await.values().cloned().collect()
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_one_by(
        &self,
        field: Field,
        value: FieldValue,
    ) -> SessionResult<Option<SessionRecord>> {
        let condition = Condition::exact(field, value)?;
        let rows = self.rows.read().await;
        Ok(rows.values().find(|r| condition.matches(r)).cloned())
    }

    async fn save_new(&self, mut record: SessionRecord) -> SessionResult<SessionRecord> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        record.id = Some(id);
        self.rows.write().await.insert(id, record.clone());
        trace!(id = id, session_id = %record.session_id, "Inserted session row");
        Ok(record)
    }

    async fn update(&self, record: &SessionRecord) -> SessionResult<()> {
        let id = persisted_id(record)?;
        let mut rows = self.rows.write().await;
        // A row swept by a concurrent GC simply stays gone.
        if let Some(row) = rows.get_mut(&id) {
            row.session_id = record.session_id.clone();
            row.data = record.data.clone();
            row.updated_on = record.updated_on;
            trace!(id = id, session_id = %record.session_id, "Updated session row");
        }
        Ok(())
    }

    async fn delete(&self, record: &SessionRecord) -> SessionResult<()> {
        let id = persisted_id(record)?;
        self.rows.write().await.remove(&id);
        trace!(id = id, session_id = %record.session_id, "Deleted session row");
        Ok(())
    }

    fn iterate_where(
        &self,
        field: Field,
        op: CompareOp,
        value: FieldValue,
    ) -> BoxStream<'_, SessionResult<SessionRecord>> {
        let condition = match Condition::new(field, op, value) {
            Ok(condition) => condition,
            Err(err) => return stream::once(async move { Err(err) }).boxed(),
        };

        // Each step resumes after the last yielded key, so rows deleted
        // between steps are never skipped or revisited.
        stream::unfold(Some(None::<i64>), move |cursor| {
            let condition = condition.clone();
            async move {
                let after = cursor?;
                let lower = match after {
                    Some(id) => Bound::Excluded(id),
                    None => Bound::Unbounded,
                };
                let rows = self.rows.read().await;
                let (id, record) = rows
                    .range((lower, Bound::Unbounded))
                    .find(|(_, r)| condition.matches(r))
                    .map(|(id, r)| (*id, r.clone()))?;
                Some((Ok(record), Some(Some(id))))
            }
        })
        .boxed()
    }

    async fn count(&self) -> SessionResult<usize> {
        Ok(self.rows.read().await.len())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
