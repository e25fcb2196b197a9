//! # Min/max saver
//!
//! Keeps the rolling minimum and maximum of numeric sensor readings and
//! republishes them as retained topics.
//!
//! ## Architecture
//!
//! ```text
//! BusEvent (mpsc)
//!     ↓
//! Dispatcher::handle_event()
//!     ↓
//! topic::classify() → SaverCommand
//!     ↓
//! SaverEngine (register / unregister / on_value / on_unit)
//!     ↓                      ↓
//! SaverRegistry          Bus::publish / subscribe
//! + schedule (lazy, midnight-aligned resets)
//! ```
//!
//! ## Module Organization
//!
//! - `types` - SaverKind, Source, SaverKey, Extreme, SaverEntry
//! - `topic` - topic building, parsing and classification
//! - `schedule` - reset boundaries and rollover
//! - `registry` - keyed saver store
//! - `engine` - min/max policy and bus side effects
//! - `dispatcher` - ordered event loop

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod registry;
pub mod schedule;
pub mod topic;
pub mod types;

pub use dispatcher::{DispatchStats, Dispatcher};
pub use engine::{EngineStats, SaverEngine};
pub use error::SaverError;
pub use registry::{SaverRegistry, Upsert};
pub use schedule::{check_and_roll, next_boundary};
pub use topic::{classify, parse_topic, DataField, SaverCommand, TopicRoute};
pub use types::{Extreme, SaverEntry, SaverKey, SaverKind, Source};
