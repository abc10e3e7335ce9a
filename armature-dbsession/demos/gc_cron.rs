//! Out-of-band session sweep, meant to run from cron.
//!
//! Run with:
//! ```sh
//! DATABASE_URL=sqlite://sessions.db?mode=rwc \
//! ARMATURE_SESSION_GC_MAX_LIFETIME=3600 \
//! cargo run --example gc_cron --features sqlite
//! ```

use armature_dbsession::prelude::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://sessions.db?mode=rwc".to_string());

    // Sweeps happen here, never on request paths.
    let config = SessionConfig::from_env()?.with_gc_probability(0.0);
    let max_lifetime = config.gc_max_lifetime;

    let store = SeaOrmRecordStore::connect(&url).await?;
    store.create_schema().await?;

    let mut handler = DbSessionHandler::new(Arc::new(store), config)?;

    match handler.gc(max_lifetime).await {
        GcOutcome::Completed { deleted } => {
            println!("Swept {} expired session(s)", deleted);
            Ok(())
        }
        GcOutcome::Failed => Err("session sweep failed, see log".into()),
    }
}
