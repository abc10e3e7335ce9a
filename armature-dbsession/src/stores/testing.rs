//! Fault-injecting store for unit tests.

use crate::error::{SessionError, SessionResult};
use crate::record::SessionRecord;
use crate::stores::{CompareOp, Field, FieldValue, MemoryRecordStore, RecordStore};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicBool, Ordering};

/// Memory store whose writes can be switched to fail.
#[derive(Default)]
pub(crate) struct FlakyStore {
    pub(crate) inner: MemoryRecordStore,
    pub(crate) fail_writes: AtomicBool,
    pub(crate) fail_reads: AtomicBool,
}

impl FlakyStore {
    fn check(&self, flag: &AtomicBool) -> SessionResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(SessionError::Connection("store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn find_one_by(
        &self,
        field: Field,
        value: FieldValue,
    ) -> SessionResult<Option<SessionRecord>> {
        self.check(&self.fail_reads)?;
        self.inner.find_one_by(field, value).await
    }

    async fn save_new(&self, record: SessionRecord) -> SessionResult<SessionRecord> {
        self.check(&self.fail_writes)?;
        self.inner.save_new(record).await
    }

    async fn update(&self, record: &SessionRecord) -> SessionResult<()> {
        self.check(&self.fail_writes)?;
        self.inner.update(record).await
    }

    async fn delete(&self, record: &SessionRecord) -> SessionResult<()> {
        self.check(&self.fail_writes)?;
        self.inner.delete(record).await
    }

    fn iterate_where(
        &self,
        field: Field,
        op: CompareOp,
        value: FieldValue,
    ) -> BoxStream<'_, SessionResult<SessionRecord>> {
        self.inner.iterate_where(field, op, value)
    }

    async fn count(&self) -> SessionResult<usize> {
        self.inner.count().await
    }

    fn store_type(&self) -> &'static str {
        "flaky"
    }
}
