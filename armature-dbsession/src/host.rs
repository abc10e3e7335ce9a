//! Request-scoped session driver.
//!
//! [`SessionHost`] plays the part of a web runtime's session module: it owns
//! one [`SessionHandler`], resolves the incoming id, keeps the payload for
//! the application and calls the handler in lifecycle order.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::gc::GcOutcome;
use crate::id::is_well_formed;
use crate::traits::SessionHandler;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts at minting an id that does not collide with a stored one.
const MAX_ID_ATTEMPTS: usize = 3;

/// Whether a session is running on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No session started
    #[default]
    None,
    /// A session is started and not yet committed, aborted or destroyed
    Active,
}

/// Drives a [`SessionHandler`] through one session at a time.
///
/// # Examples
///
/// ```
/// use armature_dbsession::{DbSessionHandler, MemoryRecordStore, SessionConfig, SessionHost};
/// use std::sync::Arc;
///
/// # async fn example() -> armature_dbsession::SessionResult<()> {
/// let config = SessionConfig::default();
/// let store = Arc::new(MemoryRecordStore::new());
/// let handler = DbSessionHandler::new(store, config.clone())?;
/// let mut host = SessionHost::new(handler, config);
///
/// let id = host.start(None).await?;
/// host.set_data("cart|a:0:{}")?;
/// host.commit().await?;
///
/// host.start(Some(&id)).await?;
/// assert_eq!(host.data(), "cart|a:0:{}");
/// host.abort().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionHost<H: SessionHandler> {
    handler: H,
    config: SessionConfig,
    status: SessionStatus,
    session_id: Option<String>,
    data: String,
    loaded: String,
}

impl<H: SessionHandler> SessionHost<H> {
    /// Create an idle host around `handler`.
    pub fn new(handler: H, config: SessionConfig) -> Self {
        Self {
            handler,
            config,
            status: SessionStatus::None,
            session_id: None,
            data: String::new(),
            loaded: String::new(),
        }
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Id of the running session.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Payload of the running session, empty when none is running.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Replace the payload of the running session.
    pub fn set_data(&mut self, data: impl Into<String>) -> SessionResult<()> {
        self.active_id()?;
        self.data = data.into();
        Ok(())
    }

    /// The installed handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Host configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Install a different handler, returning the previous one.
    ///
    /// Refused while a session is active.
    pub fn replace_handler(&mut self, handler: H) -> SessionResult<H> {
        if self.status == SessionStatus::Active {
            return Err(SessionError::AlreadyActive);
        }
        Ok(std::mem::replace(&mut self.handler, handler))
    }

    /// Start a session, resuming `candidate` when it can be trusted.
    ///
    /// Returns the id actually in use, which differs from `candidate` when
    /// the candidate was malformed or, in strict id mode, unknown.
    pub async fn start(&mut self, candidate: Option<&str>) -> SessionResult<String> {
        if self.status == SessionStatus::Active {
            return Err(SessionError::AlreadyActive);
        }

        self.handler
            .open(&self.config.save_path, &self.config.name)
            .await?;

        match self.load(candidate).await {
            Ok((id, data)) => {
                debug!(session_id = %id, "Session started");
                self.status = SessionStatus::Active;
                self.session_id = Some(id.clone());
                self.loaded = data.clone();
                self.data = data;
                Ok(id)
            }
            Err(err) => {
                self.close_quietly().await;
                Err(err)
            }
        }
    }

    /// Persist the payload and end the session.
    ///
    /// With lazy writes an unchanged payload only has its timestamp bumped.
    /// Returns whether the store accepted the payload.
    pub async fn commit(&mut self) -> SessionResult<bool> {
        let id = self.active_id()?.to_string();

        let saved = if self.config.lazy_write && self.data == self.loaded {
            let touched = self.handler.update_timestamp(&id, &self.data).await;
            if let Ok(false) = touched {
                warn!(session_id = %id, "Session timestamp was not updated");
            }
            touched
        } else {
            self.handler.write(&id, &self.data).await
        };
        let closed = self.handler.close().await;
        self.reset();

        let saved = saved?;
        closed?;
        Ok(saved)
    }

    /// End the session without saving changes.
    pub async fn abort(&mut self) -> SessionResult<()> {
        self.active_id()?;
        let closed = self.handler.close().await;
        self.reset();
        closed.map(|_| ())
    }

    /// Move the running session to a freshly minted id.
    ///
    /// The old session is deleted when `delete_old` is set, otherwise its
    /// payload is saved under the old id. The in-memory payload carries over
    /// and is persisted under the new id by the next [`commit`](Self::commit).
    pub async fn regenerate_id(&mut self, delete_old: bool) -> SessionResult<String> {
        let old = self.active_id()?.to_string();

        match self.switch_id(&old, delete_old).await {
            Ok((id, stored)) => {
                info!(old_session_id = %old, session_id = %id, "Session id regenerated");
                self.session_id = Some(id.clone());
                self.loaded = stored;
                Ok(id)
            }
            Err(err) => {
                self.close_quietly().await;
                self.reset();
                Err(err)
            }
        }
    }

    /// Delete the running session and end it.
    pub async fn destroy(&mut self) -> SessionResult<bool> {
        let id = self.active_id()?.to_string();

        let destroyed = self.handler.destroy(&id).await;
        let closed = self.handler.close().await;
        self.reset();

        let destroyed = destroyed?;
        closed?;
        debug!(session_id = %id, destroyed = destroyed, "Session destroyed");
        Ok(destroyed)
    }

    /// Run an explicit sweep.
    pub async fn gc(&mut self, max_lifetime: Duration) -> GcOutcome {
        self.handler.gc(max_lifetime).await
    }

    fn active_id(&self) -> SessionResult<&str> {
        match (&self.status, &self.session_id) {
            (SessionStatus::Active, Some(id)) => Ok(id.as_str()),
            _ => Err(SessionError::NotActive),
        }
    }

    fn reset(&mut self) {
        self.status = SessionStatus::None;
        self.session_id = None;
        self.data.clear();
        self.loaded.clear();
    }

    async fn close_quietly(&mut self) {
        if let Err(err) = self.handler.close().await {
            warn!(error = %err, "Failed to close session handler");
        }
    }

    /// Resolve the id to use after `open`, then read its payload.
    async fn load(&mut self, candidate: Option<&str>) -> SessionResult<(String, String)> {
        let id = match candidate {
            Some(id) if !is_well_formed(id) => {
                warn!("Rejected malformed session id");
                self.fresh_id().await?
            }
            Some(id) if self.config.strict_id_mode => {
                if self.handler.validate_id(id).await? {
                    id.to_string()
                } else {
                    debug!(session_id = %id, "Unknown session id, minting a new one");
                    self.fresh_id().await?
                }
            }
            Some(id) => id.to_string(),
            None => self.fresh_id().await?,
        };

        let data = self.handler.read(&id).await?;
        Ok((id, data))
    }

    /// Mint an id; in strict mode retry when it collides with a stored one.
    async fn fresh_id(&mut self) -> SessionResult<String> {
        let mut id = self.handler.create_id();
        if !self.config.strict_id_mode {
            return Ok(id);
        }

        for _ in 1..MAX_ID_ATTEMPTS {
            if !self.handler.validate_id(&id).await? {
                return Ok(id);
            }
            warn!(session_id = %id, "Generated session id collides, retrying");
            id = self.handler.create_id();
        }

        if self.handler.validate_id(&id).await? {
            return Err(SessionError::InvalidSessionId(
                "could not generate an unused session id".to_string(),
            ));
        }
        Ok(id)
    }

    async fn switch_id(&mut self, old: &str, delete_old: bool) -> SessionResult<(String, String)> {
        if delete_old {
            self.handler.destroy(old).await?;
        } else {
            self.handler.write(old, &self.data).await?;
        }
        self.handler.close().await?;

        self.handler
            .reopen(&self.config.save_path, &self.config.name)
            .await?;
        let id = self.fresh_id().await?;
        let stored = self.handler.read(&id).await?;
        Ok((id, stored))
    }
}
