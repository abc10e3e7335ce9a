//! The persisted session row.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One session row.
///
/// `id` is the store's surrogate key and stays `None` until the record is
/// inserted. `session_id` is the external identifier the handler looks rows up
/// by. `data` is the serialized session payload, never inspected here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Store-assigned surrogate key
    pub id: Option<i64>,
    /// External session identifier
    pub session_id: String,
    /// Opaque serialized payload
    pub data: String,
    /// Set once on first insert
    pub created_on: DateTime<Utc>,
    /// Bumped on every write or touch
    pub updated_on: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a fresh, unsaved record for the given session id.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            session_id: session_id.into(),
            data: String::new(),
            created_on: now,
            updated_on: now,
        }
    }

    /// Create an unsaved record with no session id yet.
    pub fn empty() -> Self {
        Self::new(String::new())
    }

    /// Whether the record has been inserted into a store.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Whether the record carries a payload worth persisting.
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Whether the record was last touched before `cutoff`.
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.updated_on < cutoff
    }

    /// Bump `updated_on` to now.
    ///
    /// Never moves backwards; a touch on the same clock tick as the previous
    /// one lands one microsecond later.
    pub fn touch(&mut self) {
        self.touch_at(Utc::now());
    }

    pub(crate) fn touch_at(&mut self, now: DateTime<Utc>) {
        self.updated_on = if now > self.updated_on {
            now
        } else {
            self.updated_on + Duration::microseconds(1)
        };
    }

    /// Stamp creation and update times just before the first insert.
    pub(crate) fn stamp_insert(&mut self) {
        let now = Utc::now();
        self.created_on = now;
        self.updated_on = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_unsaved() {
        let record = SessionRecord::new("abc");
        assert_eq!(record.session_id, "abc");
        assert!(!record.is_persisted());
        assert!(!record.has_data());
        assert_eq!(record.created_on, record.updated_on);
    }

    #[test]
    fn test_touch_is_strictly_monotonic() {
        let mut record = SessionRecord::new("abc");
        let first = record.updated_on;

        record.touch_at(first);
        assert!(record.updated_on > first);

        let second = record.updated_on;
        record.touch_at(first - Duration::seconds(10));
        assert!(record.updated_on > second);

        let later = second + Duration::seconds(5);
        record.touch_at(later);
        assert_eq!(record.updated_on, later);
    }

    #[test]
    fn test_expiry_is_strict() {
        let record = SessionRecord::new("abc");
        assert!(!record.is_expired(record.updated_on));
        assert!(record.is_expired(record.updated_on + Duration::milliseconds(1)));
    }
}
