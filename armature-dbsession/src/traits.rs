//! Session save-handler trait definition.

use crate::error::SessionResult;
use crate::gc::GcOutcome;
use async_trait::async_trait;
use std::time::Duration;

/// The lifecycle contract a session host drives once per request.
///
/// A host calls, in order: [`open`](Self::open), optionally
/// [`validate_id`](Self::validate_id) (strict id mode),
/// [`read`](Self::read), then [`write`](Self::write) or
/// [`update_timestamp`](Self::update_timestamp), then
/// [`close`](Self::close). [`destroy`](Self::destroy) and
/// [`gc`](Self::gc) are explicit, out-of-band transitions.
///
/// One handler instance serves one request at a time; it is never shared
/// between concurrently running requests.
///
/// # Examples
///
/// ```
/// use armature_dbsession::{DbSessionHandler, MemoryRecordStore, SessionConfig, SessionHandler};
/// use std::sync::Arc;
///
/// # async fn example() -> armature_dbsession::SessionResult<()> {
/// let store = Arc::new(MemoryRecordStore::new());
/// let mut handler = DbSessionHandler::new(store, SessionConfig::default())?;
///
/// handler.open("", "ARMATURESESSID").await?;
/// assert_eq!(handler.read("abc").await?, "");
/// handler.write("abc", "user_id|i:1;").await?;
/// handler.close().await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait SessionHandler: Send {
    /// Prepare for a request. Always succeeds.
    async fn open(&mut self, save_path: &str, name: &str) -> SessionResult<bool>;

    /// Open again within a request that already opened once, e.g. while
    /// regenerating the id.
    ///
    /// Implementations that roll for a sweep in `open` skip it here.
    async fn reopen(&mut self, save_path: &str, name: &str) -> SessionResult<bool> {
        self.open(save_path, name).await
    }

    /// Finish the request, persisting any unsaved payload.
    async fn close(&mut self) -> SessionResult<bool>;

    /// Load the payload of `session_id`, or `""` when there is none.
    async fn read(&mut self, session_id: &str) -> SessionResult<String>;

    /// Store `data` as the payload of `session_id`.
    async fn write(&mut self, session_id: &str, data: &str) -> SessionResult<bool>;

    /// Delete the session currently loaded for `session_id`.
    async fn destroy(&mut self, session_id: &str) -> SessionResult<bool>;

    /// Delete sessions idle for longer than `max_lifetime`.
    async fn gc(&mut self, max_lifetime: Duration) -> GcOutcome;

    /// Mint a new session id.
    fn create_id(&mut self) -> String;

    /// Whether `session_id` names an existing session.
    async fn validate_id(&mut self, session_id: &str) -> SessionResult<bool>;

    /// Store `data` and mark `session_id` as alive now.
    ///
    /// Store faults are reported as `Ok(false)`.
    async fn update_timestamp(&mut self, session_id: &str, data: &str) -> SessionResult<bool>;
}
