//! Saver engine - owns the registry and the bus, applies the min/max policy
//!
//! ## Flow
//!
//! ```text
//! register(key, hours)  -> registry upsert -> subscribe value + unit topics (new saver)
//! unregister(key)       -> tombstones      -> unsubscribe (no sibling left) -> delete
//! on_value(source, raw) -> check_and_roll  -> compare -> publish "<control> <kind>"
//! on_unit(source, unit) -> publish "<control> <kind>/meta/unit" per registered kind
//! ```
//!
//! Bus failures are logged and swallowed: delivery is the transport's concern
//! and never aborts message handling.

use crate::bus::{Bus, BusError};
use crate::saver::error::SaverError;
use crate::saver::registry::{SaverRegistry, Upsert};
use crate::saver::schedule::{check_and_roll, local_now, parse_interval_hours};
use crate::saver::topic::{
    extreme_topic, extreme_unit_topic, registration_filter, unit_topic, value_topic,
};
use crate::saver::types::{SaverKey, SaverKind, Source};
use chrono::{DateTime, FixedOffset};

/// Counters for the shutdown summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub values: u64,
    pub publications: u64,
    pub rollovers: u64,
    pub bus_errors: u64,
}

pub struct SaverEngine<B: Bus> {
    system_id: String,
    registry: SaverRegistry,
    bus: B,
    stats: EngineStats,

    /// Clock (local time with its UTC offset), replaceable for tests
    now_fn: Box<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>,
}

impl<B: Bus> SaverEngine<B> {
    /// Create an engine reading the local wall clock
    pub fn new(system_id: impl Into<String>, bus: B) -> Self {
        Self::with_clock(system_id, bus, Box::new(local_now))
    }

    /// Create an engine with a custom clock
    pub fn with_clock(
        system_id: impl Into<String>,
        bus: B,
        now_fn: Box<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>,
    ) -> Self {
        Self {
            system_id: system_id.into(),
            registry: SaverRegistry::new(),
            bus,
            stats: EngineStats::default(),
            now_fn,
        }
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn registry(&self) -> &SaverRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Subscribe to every registration addressed to this instance
    pub async fn start(&mut self) {
        let filter = registration_filter(&self.system_id);
        log::info!("📡 Subscribing to registrations: {}", filter);
        self.subscribe(&filter).await;
    }

    /// Create a saver or update its interval
    ///
    /// `hours` must be a positive number; anything else is rejected and the
    /// registry is left unchanged.
    pub async fn register(&mut self, key: SaverKey, hours: &str) -> Result<Upsert, SaverError> {
        let interval_secs = parse_interval_hours(hours)?;
        let now = (self.now_fn)();
        let source = key.source.clone();

        let outcome = self.registry.upsert(key.clone(), interval_secs, now);
        match outcome {
            Upsert::Created => {
                if let Some(entry) = self.registry.lookup(&key) {
                    log::info!(
                        "➕ Saver {} added (interval {}s, first reset {})",
                        key,
                        interval_secs,
                        entry.next_reset_at.format("%a, %d %b %Y %H:%M:%S")
                    );
                }
                self.subscribe(&value_topic(&source)).await;
                self.subscribe(&unit_topic(&source)).await;
            }
            Upsert::Updated { previous_interval_secs } => {
                log::info!(
                    "🔄 Saver {} interval {}s -> {}s",
                    key,
                    previous_interval_secs,
                    interval_secs
                );
            }
        }

        Ok(outcome)
    }

    /// Remove a saver and clear its derived topics
    ///
    /// Publishes empty retained payloads to the extreme and unit topics so
    /// downstream consumers see the control disappear. The data topics stay
    /// subscribed while the other kind is still registered for the source.
    pub async fn unregister(&mut self, key: &SaverKey) -> Result<(), SaverError> {
        let Some(entry) = self.registry.remove(key) else {
            return Err(SaverError::UnknownSaver(key.clone()));
        };
        let source = &entry.key.source;

        if self.registry.has_source(source) {
            log::debug!(
                "Keeping subscriptions for {}: {} saver still registered",
                source,
                key.kind.sibling()
            );
        } else {
            self.unsubscribe(&value_topic(source)).await;
            self.unsubscribe(&unit_topic(source)).await;
        }

        self.publish(&extreme_topic(key.kind, source), "").await;
        self.publish(&extreme_unit_topic(key.kind, source), "").await;

        log::info!("➖ Saver {} removed", key);
        Ok(())
    }

    /// Feed one reading to the min and max savers of a source
    ///
    /// Returns how many extremes were published. A non-numeric reading is
    /// rejected before any state is touched.
    pub async fn on_value(&mut self, source: &Source, raw: &str) -> Result<usize, SaverError> {
        let payload = raw.trim();
        let value: f64 = payload
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| SaverError::InvalidValue(raw.to_string()))?;

        self.stats.values += 1;
        let now = (self.now_fn)();
        let mut published = 0;

        for kind in SaverKind::all() {
            let key = SaverKey::for_source(kind, source);
            let Some(entry) = self.registry.lookup_mut(&key) else {
                continue;
            };

            if check_and_roll(entry, now) {
                self.stats.rollovers += 1;
                log::debug!(
                    "⏰ Saver {} window reset, next reset {}",
                    key,
                    entry.next_reset_at.format("%a, %d %b %Y %H:%M:%S")
                );
            }

            if entry.offer(value, payload) {
                log::debug!("Saver {} new extreme {}", key, payload);
                self.publish(&extreme_topic(kind, source), payload).await;
                published += 1;
            }
        }

        Ok(published)
    }

    /// Copy a unit onto the derived topics of every saver for the source
    pub async fn on_unit(&mut self, source: &Source, unit: &str) -> usize {
        let mut published = 0;

        for kind in SaverKind::all() {
            if self.registry.lookup(&SaverKey::for_source(kind, source)).is_none() {
                continue;
            }
            log::debug!("Saver {} {} unit '{}'", kind, source, unit);
            self.publish(&extreme_unit_topic(kind, source), unit).await;
            published += 1;
        }

        published
    }

    /// Re-issue every subscription after the transport lost them
    pub async fn on_reconnect(&mut self) {
        let sources = self.registry.sources();
        log::info!(
            "🔌 Reconnected, restoring subscriptions for {} sources",
            sources.len()
        );

        self.start().await;
        for source in &sources {
            self.subscribe(&value_topic(source)).await;
            self.subscribe(&unit_topic(source)).await;
        }
    }

    pub async fn flush(&mut self) -> Result<(), BusError> {
        self.bus.flush().await
    }

    async fn subscribe(&mut self, filter: &str) {
        if let Err(e) = self.bus.subscribe(filter).await {
            self.stats.bus_errors += 1;
            log::warn!("⚠️  Subscribe to '{}' failed: {}", filter, e);
        }
    }

    async fn unsubscribe(&mut self, filter: &str) {
        if let Err(e) = self.bus.unsubscribe(filter).await {
            self.stats.bus_errors += 1;
            log::warn!("⚠️  Unsubscribe from '{}' failed: {}", filter, e);
        }
    }

    /// All derived topics are retained
    async fn publish(&mut self, topic: &str, payload: &str) {
        match self.bus.publish(topic, payload, true).await {
            Ok(()) => self.stats.publications += 1,
            Err(e) => {
                self.stats.bus_errors += 1;
                log::warn!("⚠️  Publish to '{}' failed: {}", topic, e);
            }
        }
    }
}
