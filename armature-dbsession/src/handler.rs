//! Database-backed session save handler.

use crate::config::{DestroyPolicy, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::gc::{self, GcOutcome, GcTrigger};
use crate::id::IdGenerator;
use crate::record::SessionRecord;
use crate::stores::{Field, RecordStore};
use crate::traits::SessionHandler;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Lifecycle state of a [`DbSessionHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Before `open` or after `close`
    Closed,
    /// Opened, nothing read yet
    Open,
    /// A record (found or fresh) is current
    Loaded,
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerState::Closed => write!(f, "closed"),
            HandlerState::Open => write!(f, "open"),
            HandlerState::Loaded => write!(f, "loaded"),
        }
    }
}

/// Session handler keeping one row per session in a [`RecordStore`].
///
/// Writes are persisted immediately rather than deferred to `close`, trading
/// one extra store round trip for not losing a payload when the process dies
/// between `write` and `close`.
///
/// # Examples
///
/// ```
/// use armature_dbsession::{DbSessionHandler, MemoryRecordStore, SessionConfig, SessionHandler};
/// use std::sync::Arc;
///
/// # async fn example() -> armature_dbsession::SessionResult<()> {
/// let store = Arc::new(MemoryRecordStore::new());
///
/// let mut first = DbSessionHandler::new(store.clone(), SessionConfig::default())?;
/// first.open("", "ARMATURESESSID").await?;
/// first.read("abc").await?;
/// first.write("abc", "v1").await?;
/// first.close().await?;
///
/// let mut second = DbSessionHandler::new(store, SessionConfig::default())?;
/// second.open("", "ARMATURESESSID").await?;
/// assert_eq!(second.read("abc").await?, "v1");
/// # Ok(())
/// # }
/// ```
pub struct DbSessionHandler<S: RecordStore + ?Sized> {
    store: Arc<S>,
    config: SessionConfig,
    ids: IdGenerator,
    gc_trigger: GcTrigger,
    state: HandlerState,
    current: SessionRecord,
    dirty: bool,
}

impl<S: RecordStore + ?Sized> DbSessionHandler<S> {
    /// Create a handler over a shared store.
    pub fn new(store: Arc<S>, config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            ids: config.id_generator(),
            gc_trigger: config.gc_trigger(),
            config,
            state: HandlerState::Closed,
            current: SessionRecord::empty(),
            dirty: false,
        })
    }

    /// Replace the trigger evaluated on `open`.
    pub fn with_gc_trigger(mut self, trigger: GcTrigger) -> Self {
        self.gc_trigger = trigger;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// The record loaded or created for the in-flight request.
    pub fn current(&self) -> &SessionRecord {
        &self.current
    }

    /// The shared record store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The handler configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn ensure_active(&self, operation: &'static str) -> SessionResult<()> {
        if self.state == HandlerState::Closed {
            return Err(SessionError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Make the current record belong to `session_id`.
    fn adopt(&mut self, session_id: &str) {
        if self.current.session_id == session_id {
            return;
        }
        if self.current.is_persisted() {
            // Never rewrite another session's row under a new id.
            debug!(
                from = %self.current.session_id,
                to = %session_id,
                "Switching current record to a fresh session"
            );
            self.current = SessionRecord::new(session_id);
        } else {
            self.current.session_id = session_id.to_string();
        }
    }

    fn start(&mut self, save_path: &str, name: &str) {
        if self.state != HandlerState::Closed {
            debug!(state = %self.state, "Reopening session handler");
        }

        self.state = HandlerState::Open;
        self.current = SessionRecord::empty();
        self.dirty = false;
        debug!(save_path = %save_path, name = %name, "Session handler opened");
    }

    /// Insert or update the current record.
    ///
    /// Unsaved records without data are not inserted.
    async fn persist(&mut self) -> SessionResult<()> {
        if self.current.is_persisted() {
            self.current.touch();
            self.store.update(&self.current).await?;
        } else if self.current.has_data() {
            self.current.stamp_insert();
            self.current = self.store.save_new(self.current.clone()).await?;
        }
        self.dirty = false;
        Ok(())
    }
}

#[async_trait]
impl<S: RecordStore + ?Sized> SessionHandler for DbSessionHandler<S> {
    async fn open(&mut self, save_path: &str, name: &str) -> SessionResult<bool> {
        self.start(save_path, name);

        if self.gc_trigger.should_trigger() {
            let outcome = gc::sweep(&*self.store, self.config.gc_max_lifetime).await;
            debug!(outcome = ?outcome, "Probabilistic session sweep ran on open");
        }
        Ok(true)
    }

    async fn reopen(&mut self, save_path: &str, name: &str) -> SessionResult<bool> {
        self.start(save_path, name);
        Ok(true)
    }

    async fn close(&mut self) -> SessionResult<bool> {
        let result = if self.state != HandlerState::Closed && self.dirty {
            self.persist().await
        } else {
            Ok(())
        };

        self.state = HandlerState::Closed;
        self.current = SessionRecord::empty();
        self.dirty = false;

        result?;
        Ok(true)
    }

    async fn read(&mut self, session_id: &str) -> SessionResult<String> {
        self.ensure_active("read")?;

        // A failed lookup must not leave a previous record current.
        self.current = SessionRecord::new(session_id);
        self.dirty = false;

        match self
            .store
            .find_one_by(Field::SessionId, session_id.into())
            .await?
        {
            Some(record) => {
                debug!(session_id = %session_id, "Session loaded");
                self.current = record;
            }
            None => {
                debug!(session_id = %session_id, "No stored session, starting fresh");
            }
        }

        self.state = HandlerState::Loaded;
        Ok(self.current.data.clone())
    }

    async fn write(&mut self, session_id: &str, data: &str) -> SessionResult<bool> {
        self.ensure_active("write")?;
        self.adopt(session_id);
        self.current.data = data.to_string();
        self.dirty = true;
        self.persist().await?;
        Ok(true)
    }

    async fn destroy(&mut self, session_id: &str) -> SessionResult<bool> {
        self.ensure_active("destroy")?;

        let matched = self.current.is_persisted() && self.current.session_id == session_id;
        let deleted = if matched {
            match self.store.delete(&self.current).await {
                Ok(()) => {
                    debug!(session_id = %session_id, "Session destroyed");
                    true
                }
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "Failed to destroy session");
                    false
                }
            }
        } else {
            debug!(session_id = %session_id, "No loaded session to destroy");
            false
        };

        if deleted {
            self.current = SessionRecord::empty();
            self.dirty = false;
            self.state = HandlerState::Open;
        }

        Ok(match self.config.destroy_policy {
            DestroyPolicy::Lenient => true,
            DestroyPolicy::Strict => deleted,
        })
    }

    async fn gc(&mut self, max_lifetime: Duration) -> GcOutcome {
        gc::sweep(&*self.store, max_lifetime).await
    }

    fn create_id(&mut self) -> String {
        self.ids.create()
    }

    async fn validate_id(&mut self, session_id: &str) -> SessionResult<bool> {
        let exists = self
            .store
            .find_one_by(Field::SessionId, session_id.into())
            .await?
            .is_some();
        debug!(session_id = %session_id, exists = exists, "Validated session id");
        Ok(exists)
    }

    async fn update_timestamp(&mut self, session_id: &str, data: &str) -> SessionResult<bool> {
        self.ensure_active("update timestamp")?;
        self.adopt(session_id);
        self.current.data = data.to_string();
        self.dirty = true;

        match self.persist().await {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Failed to update session timestamp");
                // Given up on; close must not retry and raise it.
                self.dirty = false;
                Ok(false)
            }
        }
    }
}
