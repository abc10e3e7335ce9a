//! Call-order tests for the session host

use armature_dbsession::*;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Handler wrapper recording every lifecycle call it forwards.
struct CallTracer<H> {
    inner: H,
    calls: Arc<Mutex<Vec<String>>>,
}

impl<H> CallTracer<H> {
    fn new(inner: H) -> (Self, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let tracer = Self {
            inner,
            calls: calls.clone(),
        };
        (tracer, calls)
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl<H: SessionHandler> SessionHandler for CallTracer<H> {
    async fn open(&mut self, save_path: &str, name: &str) -> SessionResult<bool> {
        self.record("open");
        self.inner.open(save_path, name).await
    }

    async fn reopen(&mut self, save_path: &str, name: &str) -> SessionResult<bool> {
        self.record("reopen");
        self.inner.reopen(save_path, name).await
    }

    async fn close(&mut self) -> SessionResult<bool> {
        self.record("close");
        self.inner.close().await
    }

    async fn read(&mut self, session_id: &str) -> SessionResult<String> {
        self.record("read");
        self.inner.read(session_id).await
    }

    async fn write(&mut self, session_id: &str, data: &str) -> SessionResult<bool> {
        self.record("write");
        self.inner.write(session_id, data).await
    }

    async fn destroy(&mut self, session_id: &str) -> SessionResult<bool> {
        self.record("destroy");
        self.inner.destroy(session_id).await
    }

    async fn gc(&mut self, max_lifetime: Duration) -> GcOutcome {
        self.record("gc");
        self.inner.gc(max_lifetime).await
    }

    fn create_id(&mut self) -> String {
        self.record("create_id");
        self.inner.create_id()
    }

    async fn validate_id(&mut self, session_id: &str) -> SessionResult<bool> {
        self.record("validate_id");
        self.inner.validate_id(session_id).await
    }

    async fn update_timestamp(&mut self, session_id: &str, data: &str) -> SessionResult<bool> {
        self.record("update_timestamp");
        self.inner.update_timestamp(session_id, data).await
    }
}

type TracedHost = SessionHost<CallTracer<DbSessionHandler<MemoryRecordStore>>>;

fn traced_host(
    store: &Arc<MemoryRecordStore>,
    config: SessionConfig,
) -> (TracedHost, Arc<Mutex<Vec<String>>>) {
    let handler = DbSessionHandler::new(store.clone(), config.clone()).unwrap();
    let (tracer, calls) = CallTracer::new(handler);
    (SessionHost::new(tracer, config), calls)
}

fn take(calls: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    std::mem::take(&mut *calls.lock().unwrap())
}

fn config() -> SessionConfig {
    SessionConfig::default().with_gc_probability(0.0)
}

#[tokio::test]
async fn test_new_session_call_order() {
    let store = Arc::new(MemoryRecordStore::new());
    let (mut host, calls) = traced_host(&store, config());

    host.start(None).await.unwrap();
    host.set_data("v1").unwrap();
    host.commit().await.unwrap();

    assert_eq!(
        take(&calls),
        ["open", "create_id", "validate_id", "read", "write", "close"]
    );
}

#[tokio::test]
async fn test_resumed_unchanged_session_uses_update_timestamp() {
    let store = Arc::new(MemoryRecordStore::new());
    let (mut host, calls) = traced_host(&store, config());

    let id = host.start(None).await.unwrap();
    host.set_data("v1").unwrap();
    host.commit().await.unwrap();
    take(&calls);

    host.start(Some(&id)).await.unwrap();
    host.commit().await.unwrap();

    assert_eq!(
        take(&calls),
        ["open", "validate_id", "read", "update_timestamp", "close"]
    );
}

#[tokio::test]
async fn test_eager_write_when_lazy_write_disabled() {
    let store = Arc::new(MemoryRecordStore::new());
    let config = config().with_lazy_write(false).with_strict_id_mode(false);
    let (mut host, calls) = traced_host(&store, config);

    host.start(Some("abc")).await.unwrap();
    host.commit().await.unwrap();

    assert_eq!(take(&calls), ["open", "read", "write", "close"]);
}

#[tokio::test]
async fn test_regenerate_call_order() {
    let store = Arc::new(MemoryRecordStore::new());
    let (mut host, calls) = traced_host(&store, config());

    let id = host.start(None).await.unwrap();
    host.set_data("v1").unwrap();
    host.commit().await.unwrap();

    host.start(Some(&id)).await.unwrap();
    take(&calls);

    host.regenerate_id(true).await.unwrap();
    host.commit().await.unwrap();

    assert_eq!(
        take(&calls),
        [
            "destroy",
            "close",
            "reopen",
            "create_id",
            "validate_id",
            "read",
            "write",
            "close"
        ]
    );
}

#[tokio::test]
async fn test_destroy_call_order() {
    let store = Arc::new(MemoryRecordStore::new());
    let (mut host, calls) = traced_host(&store, config().with_strict_id_mode(false));

    host.start(Some("abc")).await.unwrap();
    take(&calls);
    host.destroy().await.unwrap();

    assert_eq!(take(&calls), ["destroy", "close"]);
}

#[tokio::test]
async fn test_second_start_touches_nothing() {
    let store = Arc::new(MemoryRecordStore::new());
    let (mut host, calls) = traced_host(&store, config());

    host.start(None).await.unwrap();
    take(&calls);

    assert!(matches!(
        host.start(None).await,
        Err(SessionError::AlreadyActive)
    ));
    assert!(take(&calls).is_empty());
}

#[tokio::test]
async fn test_explicit_gc_sweeps_expired_rows() {
    let store = Arc::new(MemoryRecordStore::new());
    let (mut host, calls) = traced_host(&store, config());

    host.start(None).await.unwrap();
    host.set_data("v1").unwrap();
    host.commit().await.unwrap();
    take(&calls);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let outcome = host.gc(Duration::ZERO).await;

    assert_eq!(outcome.deleted(), 1);
    assert_eq!(take(&calls), ["gc"]);
}

#[tokio::test]
async fn test_gc_trigger_fires_inside_open() {
    let store = Arc::new(MemoryRecordStore::new());
    let mut stale = SessionRecord::new("stale");
    stale.data = "x".to_string();
    stale.updated_on = chrono::Utc::now() - chrono::Duration::hours(1);
    store.save_new(stale).await.unwrap();

    let config = config()
        .with_gc_probability(1.0)
        .with_gc_max_lifetime(Duration::from_secs(60));
    let (mut host, calls) = traced_host(&store, config);

    host.start(None).await.unwrap();
    host.abort().await.unwrap();

    // the sweep runs inside open, not as a separate handler call
    assert_eq!(take(&calls), ["open", "create_id", "validate_id", "read", "close"]);
    assert_eq!(store.count().await.unwrap(), 0);
}
