//! Topic filter matching with MQTT-style wildcards

use std::collections::BTreeSet;

/// Returns true if `topic` matches `filter`
///
/// `+` matches exactly one level (an empty level included), `#` matches the
/// remaining levels including none at all.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Set of active subscription filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    filters: BTreeSet<String>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the filter was already present
    pub fn insert(&mut self, filter: &str) -> bool {
        self.filters.insert(filter.to_string())
    }

    pub fn remove(&mut self, filter: &str) -> bool {
        self.filters.remove(filter)
    }

    pub fn contains(&self, filter: &str) -> bool {
        self.filters.contains(filter)
    }

    /// Does any active filter accept this topic
    pub fn matches(&self, topic: &str) -> bool {
        self.filters.iter().any(|f| topic_matches(f, topic))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(String::as_str)
    }
}
