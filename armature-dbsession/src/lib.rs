//! Database-backed session handler for Armature framework.
//!
//! Keeps server-side session state as one row per session in a record store
//! and drives it through the request lifecycle a web runtime expects:
//! `open` → `validate_id` → `read` → `write` / `update_timestamp` → `close`,
//! with `destroy` and `gc` as explicit transitions.
//!
//! # Features
//!
//! - `seaorm` - relational record store built on SeaORM
//! - `sqlite` / `postgres` / `mysql` - SeaORM driver (each enables `seaorm`)
//! - `full` - every driver
//!
//! Without any feature the crate ships the in-memory store, which suits
//! tests and single-process deployments.
//!
//! # Examples
//!
//! ## Driving a session through a host
//!
//! ```
//! use armature_dbsession::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let config = SessionConfig::default();
//!     let store = Arc::new(MemoryRecordStore::new());
//!     let handler = DbSessionHandler::new(store, config.clone())?;
//!     let mut host = SessionHost::new(handler, config);
//!
//!     // First request: no cookie yet
//!     let id = host.start(None).await?;
//!     host.set_data("user_id|i:42;")?;
//!     host.commit().await?;
//!
//!     // Next request presents the id
//!     host.start(Some(&id)).await?;
//!     assert_eq!(host.data(), "user_id|i:42;");
//!
//!     // Login: move the payload to a fresh id
//!     host.regenerate_id(true).await?;
//!     host.commit().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## SeaORM store (requires a driver feature)
//!
//! ```ignore
//! use armature_dbsession::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let store = SeaOrmRecordStore::connect("postgres://localhost/app").await?;
//!     store.create_schema().await?;
//!
//!     let config = SessionConfig::from_env()?;
//!     let mut handler = DbSessionHandler::new(Arc::new(store), config)?;
//!
//!     // Out-of-band sweep, e.g. from a cron job
//!     let outcome = handler.gc(Duration::from_secs(1440)).await;
//!     println!("deleted {}", outcome.deleted());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod gc;
pub mod handler;
pub mod host;
pub mod id;
pub mod record;
pub mod stores;
pub mod traits;

pub use config::{DestroyPolicy, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use gc::{GcOutcome, GcTrigger};
pub use handler::{DbSessionHandler, HandlerState};
pub use host::{SessionHost, SessionStatus};
pub use id::{IdGenerator, IdStrategy, is_well_formed};
pub use record::SessionRecord;
pub use stores::{CompareOp, Field, FieldValue, MemoryRecordStore, RecordStore};
pub use traits::SessionHandler;

#[cfg(feature = "seaorm")]
pub use stores::SeaOrmRecordStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{DestroyPolicy, SessionConfig};
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::gc::{GcOutcome, GcTrigger};
    pub use crate::handler::DbSessionHandler;
    pub use crate::host::{SessionHost, SessionStatus};
    pub use crate::stores::{MemoryRecordStore, RecordStore};
    pub use crate::traits::SessionHandler;

    #[cfg(feature = "seaorm")]
    pub use crate::stores::SeaOrmRecordStore;
}
