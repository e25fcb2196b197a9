//! In-memory store of registered savers
//!
//! The registry is owned by exactly one `SaverEngine`, which in turn is owned
//! by the dispatcher task. It is never shared between threads: all reads and
//! writes happen inside the message-handling context, one event at a time,
//! which is why it carries no locking of its own.

use crate::saver::schedule::next_boundary;
use crate::saver::types::{SaverEntry, SaverKey, SaverKind, Source};
use chrono::{DateTime, FixedOffset};
use std::collections::{BTreeSet, HashMap};

/// Outcome of `SaverRegistry::upsert`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    /// Only the interval changed; the running window is left alone
    Updated { previous_interval_secs: i64 },
}

#[derive(Debug, Default)]
pub struct SaverRegistry {
    entries: HashMap<SaverKey, SaverEntry>,
}

impl SaverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &SaverKey) -> Option<&SaverEntry> {
        self.entries.get(key)
    }

    pub fn lookup_mut(&mut self, key: &SaverKey) -> Option<&mut SaverEntry> {
        self.entries.get_mut(key)
    }

    /// Create a saver, or change the interval of an existing one
    ///
    /// New entries start with no extreme and a boundary on the midnight grid.
    /// Existing entries keep `next_reset_at` and their extreme.
    pub fn upsert(&mut self, key: SaverKey, interval_secs: i64, now: DateTime<FixedOffset>) -> Upsert {
        if let Some(entry) = self.entries.get_mut(&key) {
            let previous_interval_secs = entry.reset_interval_secs;
            entry.reset_interval_secs = interval_secs;
            return Upsert::Updated { previous_interval_secs };
        }

        let next_reset_at = next_boundary(interval_secs, now);
        self.entries
            .insert(key.clone(), SaverEntry::new(key, interval_secs, next_reset_at));
        Upsert::Created
    }

    pub fn remove(&mut self, key: &SaverKey) -> Option<SaverEntry> {
        self.entries.remove(key)
    }

    /// Is any saver (min or max) still registered for this source
    pub fn has_source(&self, source: &Source) -> bool {
        SaverKind::all()
            .into_iter()
            .any(|kind| self.entries.contains_key(&SaverKey::for_source(kind, source)))
    }

    /// Distinct sources with at least one saver, sorted
    pub fn sources(&self) -> Vec<Source> {
        self.entries
            .keys()
            .map(|key| key.source.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SaverEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saver::types::Extreme;
    use chrono::TimeZone;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 9, 41, 0)
            .unwrap()
    }

    fn key(kind: SaverKind, control: &str) -> SaverKey {
        SaverKey::new(kind, "energy", control)
    }

    #[test]
    fn test_upsert_creates_entry() {
        let mut registry = SaverRegistry::new();
        assert_eq!(registry.upsert(key(SaverKind::Min, "Power"), 3600, now()), Upsert::Created);

        let entry = registry.lookup(&key(SaverKind::Min, "Power")).unwrap();
        assert_eq!(entry.reset_interval_secs, 3600);
        assert!(entry.extreme.is_absent());
        assert_eq!(entry.next_reset_at, next_boundary(3600, now()));
        assert!(registry.lookup(&key(SaverKind::Max, "Power")).is_none());
    }

    #[test]
    fn test_reregistration_only_changes_interval() {
        let mut registry = SaverRegistry::new();
        registry.upsert(key(SaverKind::Max, "Power"), 86_400, now());

        let entry = registry.lookup_mut(&key(SaverKind::Max, "Power")).unwrap();
        entry.offer(12.0, "12");
        let boundary = entry.next_reset_at;

        let later = now() + chrono::Duration::hours(3);
        assert_eq!(
            registry.upsert(key(SaverKind::Max, "Power"), 3600, later),
            Upsert::Updated {
                previous_interval_secs: 86_400
            }
        );

        let entry = registry.lookup(&key(SaverKind::Max, "Power")).unwrap();
        assert_eq!(entry.reset_interval_secs, 3600);
        assert_eq!(entry.next_reset_at, boundary);
        assert_eq!(
            entry.extreme,
            Extreme::Held {
                value: 12.0,
                payload: "12".to_string()
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_and_source_tracking() {
        let mut registry = SaverRegistry::new();
        registry.upsert(key(SaverKind::Min, "Power"), 3600, now());
        registry.upsert(key(SaverKind::Max, "Power"), 3600, now());
        registry.upsert(key(SaverKind::Min, "Voltage"), 3600, now());

        let source = Source::new("energy", "Power");
        assert_eq!(registry.sources().len(), 2);
        assert!(registry.has_source(&source));

        assert!(registry.remove(&key(SaverKind::Min, "Power")).is_some());
        assert!(registry.has_source(&source));
        assert!(registry.remove(&key(SaverKind::Min, "Power")).is_none());

        registry.remove(&key(SaverKind::Max, "Power"));
        assert!(!registry.has_source(&source));
        assert_eq!(registry.sources(), vec![Source::new("energy", "Voltage")]);
        assert!(!registry.is_empty());
    }
}
