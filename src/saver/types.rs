//! Core data structures for saver state

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which extreme a saver tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaverKind {
    Min,
    Max,
}

impl SaverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaverKind::Min => "min",
            SaverKind::Max => "max",
        }
    }

    /// Parse the `<kind>` segment of a registration topic
    pub fn from_segment(s: &str) -> Option<Self> {
        match s {
            "min" => Some(SaverKind::Min),
            "max" => Some(SaverKind::Max),
            _ => None,
        }
    }

    pub fn all() -> [SaverKind; 2] {
        [SaverKind::Min, SaverKind::Max]
    }

    /// The other kind for the same source
    pub fn sibling(&self) -> SaverKind {
        match self {
            SaverKind::Min => SaverKind::Max,
            SaverKind::Max => SaverKind::Min,
        }
    }

    /// True if `candidate` should replace `current` as this kind's extreme
    pub fn improves(&self, candidate: f64, current: f64) -> bool {
        match self {
            SaverKind::Min => candidate < current,
            SaverKind::Max => candidate > current,
        }
    }
}

impl fmt::Display for SaverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream device/control being observed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Source {
    pub system: String,
    pub control: String,
}

impl Source {
    pub fn new(system: impl Into<String>, control: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            control: control.into(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.system, self.control)
    }
}

/// Registry key: one saver per (kind, system, control)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SaverKey {
    pub kind: SaverKind,
    pub source: Source,
}

impl SaverKey {
    pub fn new(kind: SaverKind, system: impl Into<String>, control: impl Into<String>) -> Self {
        Self {
            kind,
            source: Source::new(system, control),
        }
    }

    pub fn for_source(kind: SaverKind, source: &Source) -> Self {
        Self {
            kind,
            source: source.clone(),
        }
    }

    pub fn system(&self) -> &str {
        &self.source.system
    }

    pub fn control(&self) -> &str {
        &self.source.control
    }
}

impl fmt::Display for SaverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.source)
    }
}

/// Current extreme of a saver's window
///
/// `Absent` means no reading since creation or since the last reset. It is a
/// separate state so that a legitimate reading of zero is never mistaken for it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Extreme {
    #[default]
    Absent,
    Held {
        value: f64,
        /// Reading as received, republished verbatim
        payload: String,
    },
}

impl Extreme {
    pub fn is_absent(&self) -> bool {
        matches!(self, Extreme::Absent)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Extreme::Absent => None,
            Extreme::Held { value, .. } => Some(*value),
        }
    }

    pub fn payload(&self) -> Option<&str> {
        match self {
            Extreme::Absent => None,
            Extreme::Held { payload, .. } => Some(payload),
        }
    }
}

/// Aggregation state of one registered saver
#[derive(Debug, Clone, PartialEq)]
pub struct SaverEntry {
    pub key: SaverKey,
    /// Window length in seconds, always > 0
    pub reset_interval_secs: i64,
    /// End of the current window
    pub next_reset_at: DateTime<FixedOffset>,
    pub extreme: Extreme,
}

impl SaverEntry {
    pub fn new(key: SaverKey, reset_interval_secs: i64, next_reset_at: DateTime<FixedOffset>) -> Self {
        Self {
            key,
            reset_interval_secs,
            next_reset_at,
            extreme: Extreme::Absent,
        }
    }

    /// Offer a reading; returns true if it became the new extreme
    pub fn offer(&mut self, value: f64, payload: &str) -> bool {
        let replace = match self.extreme.value() {
            None => true,
            Some(current) => self.key.kind.improves(value, current),
        };

        if replace {
            self.extreme = Extreme::Held {
                value,
                payload: payload.to_string(),
            };
        }

        replace
    }
}
