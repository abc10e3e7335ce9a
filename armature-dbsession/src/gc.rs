//! Garbage collection: when to sweep and how.

use crate::stores::{CompareOp, Field, RecordStore};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcOutcome {
    /// The sweep ran to completion
    Completed {
        /// Rows deleted
        deleted: usize,
    },
    /// The store failed part way; rows deleted before the fault stay deleted
    Failed,
}

impl GcOutcome {
    /// Whether the sweep completed.
    pub fn is_success(&self) -> bool {
        matches!(self, GcOutcome::Completed { .. })
    }

    /// Rows deleted by a completed sweep, zero otherwise.
    pub fn deleted(&self) -> usize {
        match self {
            GcOutcome::Completed { deleted } => *deleted,
            GcOutcome::Failed => 0,
        }
    }
}

/// Probabilistic sweep trigger evaluated on every `open`.
///
/// A probability `p` becomes an integer range `n = round(1 / p)`; a uniform
/// draw from `0..=n` fires the sweep when it lands on `n`. No background
/// scheduler is needed: the cost is amortized over requests.
///
/// ```
/// use armature_dbsession::GcTrigger;
///
/// let trigger = GcTrigger::new(0.01);
/// assert_eq!(trigger.draw_range(), Some(100));
/// assert!(trigger.should_trigger_with(|max| max));
/// assert!(!trigger.should_trigger_with(|_| 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcTrigger {
    probability: f64,
}

impl GcTrigger {
    /// Trigger firing with roughly the given probability.
    ///
    /// Values at or below zero (and NaN) never fire, values at or above one
    /// always fire.
    pub fn new(probability: f64) -> Self {
        let probability = if probability.is_nan() { 0.0 } else { probability };
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    /// Trigger from a `probability / divisor` pair, e.g. `1 / 100`.
    pub fn from_ratio(probability: u32, divisor: u32) -> Self {
        if divisor == 0 {
            return Self::never();
        }
        Self::new(f64::from(probability) / f64::from(divisor))
    }

    /// Trigger that never fires.
    pub fn never() -> Self {
        Self { probability: 0.0 }
    }

    /// Trigger that fires on every evaluation.
    pub fn always() -> Self {
        Self { probability: 1.0 }
    }

    /// The configured probability.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Upper bound of the draw, or `None` when the trigger never fires.
    pub fn draw_range(&self) -> Option<u32> {
        if self.probability <= 0.0 {
            return None;
        }
        if self.probability >= 1.0 {
            return Some(0);
        }
        let range = (1.0 / self.probability).round();
        Some(if range >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            range as u32
        })
    }

    /// Decide using an injected draw.
    ///
    /// `draw` receives the inclusive upper bound `n` and must return a value
    /// in `0..=n`. The sweep fires when the value equals `n`.
    pub fn should_trigger_with<F>(&self, draw: F) -> bool
    where
        F: FnOnce(u32) -> u32,
    {
        match self.draw_range() {
            None => false,
            Some(0) => true,
            Some(max) => draw(max) == max,
        }
    }

    /// Decide using the thread-local random generator.
    pub fn should_trigger(&self) -> bool {
        let mut rng = rand::rng();
        self.should_trigger_with(|max| rng.random_range(0..=max))
    }
}

/// Rows last touched before this instant are expired.
pub fn expiry_cutoff(now: DateTime<Utc>, max_lifetime: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(max_lifetime)
        .ok()
        .and_then(|lifetime| now.checked_sub_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Delete every row whose `updated_on` is older than `max_lifetime`.
///
/// Store faults are logged and reported as [`GcOutcome::Failed`]; they never
/// propagate. A row re-touched by a concurrent request between the scan and
/// its delete is lost, which costs that client its session but corrupts
/// nothing.
pub async fn sweep<S>(store: &S, max_lifetime: Duration) -> GcOutcome
where
    S: RecordStore + ?Sized,
{
    let cutoff = expiry_cutoff(Utc::now(), max_lifetime);
    debug!(cutoff = %cutoff, store = store.store_type(), "Sweeping expired sessions");

    let mut expired = store.iterate_where(Field::UpdatedOn, CompareOp::Lt, cutoff.into());
    let mut deleted = 0;

    while let Some(row) = expired.next().await {
        let result = match row {
            Ok(record) => store.delete(&record).await,
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            warn!(error = %err, deleted = deleted, "Session sweep aborted");
            return GcOutcome::Failed;
        }
        deleted += 1;
    }

    info!(deleted = deleted, "Session sweep complete");
    GcOutcome::Completed { deleted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SessionRecord;
    use crate::stores::MemoryRecordStore;
    use chrono::TimeZone;

    #[test]
    fn test_draw_range() {
        assert_eq!(GcTrigger::new(0.0).draw_range(), None);
        assert_eq!(GcTrigger::new(-1.0).draw_range(), None);
        assert_eq!(GcTrigger::new(f64::NAN).draw_range(), None);
        assert_eq!(GcTrigger::new(1.0).draw_range(), Some(0));
        assert_eq!(GcTrigger::new(5.0).draw_range(), Some(0));
        assert_eq!(GcTrigger::new(0.001).draw_range(), Some(1000));
        assert_eq!(GcTrigger::new(0.3).draw_range(), Some(3));
        assert_eq!(GcTrigger::new(1e-12).draw_range(), Some(u32::MAX));
    }

    #[test]
    fn test_from_ratio() {
        assert_eq!(GcTrigger::from_ratio(1, 100).draw_range(), Some(100));
        assert_eq!(GcTrigger::from_ratio(1, 0), GcTrigger::never());
        assert_eq!(GcTrigger::from_ratio(0, 100), GcTrigger::never());
        assert_eq!(GcTrigger::from_ratio(3, 1), GcTrigger::always());
    }

    #[test]
    fn test_fires_only_on_sentinel() {
        let trigger = GcTrigger::new(0.1);
        assert!(trigger.should_trigger_with(|max| max));
        assert!(!trigger.should_trigger_with(|max| max - 1));
        assert!(!trigger.should_trigger_with(|_| 0));
    }

    #[test]
    fn test_never_and_always_skip_the_draw() {
        let mut drawn = false;
        assert!(!GcTrigger::never().should_trigger_with(|max| {
            drawn = true;
            max
        }));
        assert!(GcTrigger::always().should_trigger_with(|_| {
            drawn = true;
            0
        }));
        assert!(!drawn);
    }

    #[test]
    fn test_random_trigger_extremes() {
        for _ in 0..100 {
            assert!(GcTrigger::always().should_trigger());
            assert!(!GcTrigger::never().should_trigger());
        }
    }

    #[test]
    fn test_expiry_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(
            expiry_cutoff(now, Duration::from_secs(3600)),
            Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap()
        );
        assert_eq!(expiry_cutoff(now, Duration::ZERO), now);
        assert_eq!(expiry_cutoff(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_expired() {
        let store = MemoryRecordStore::new();

        let mut stale = SessionRecord::new("stale");
        stale.updated_on = Utc::now() - chrono::Duration::hours(2);
        store.save_new(stale).await.unwrap();
        store.save_new(SessionRecord::new("fresh")).await.unwrap();

        let outcome = sweep(&store, Duration::from_secs(3600)).await;
        assert_eq!(outcome, GcOutcome::Completed { deleted: 1 });

        let rows = store.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].session_id, "fresh");
    }
}
