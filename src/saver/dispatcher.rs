//! Message dispatcher - the single consumer of bus events
//!
//! Events arrive over one mpsc channel and are handled strictly one at a
//! time, so the engine (and its registry) only ever has one writer.

use crate::bus::{Bus, BusEvent, InboundMessage};
use crate::saver::engine::SaverEngine;
use crate::saver::error::SaverError;
use crate::saver::topic::{classify, SaverCommand};
use std::ops::ControlFlow;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: u64,
    pub dropped: u64,
    pub reconnects: u64,
}

pub struct Dispatcher<B: Bus> {
    engine: SaverEngine<B>,
    stats: DispatchStats,
}

impl<B: Bus> Dispatcher<B> {
    pub fn new(engine: SaverEngine<B>) -> Self {
        Self {
            engine,
            stats: DispatchStats::default(),
        }
    }

    pub fn engine(&self) -> &SaverEngine<B> {
        &self.engine
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn into_engine(self) -> SaverEngine<B> {
        self.engine
    }

    /// Startup subscription to the registration wildcard
    pub async fn start(&mut self) {
        self.engine.start().await;
    }

    /// Classify and route one inbound message
    ///
    /// Returns false if the message was dropped.
    pub async fn handle(&mut self, message: &InboundMessage) -> bool {
        log::debug!("📥 {}: '{}'", message.topic, message.payload);

        let result = match classify(message, self.engine.system_id()) {
            Ok(SaverCommand::Register { key, hours }) => self.engine.register(key, &hours).await.map(|_| ()),
            Ok(SaverCommand::Remove { key }) => self.engine.unregister(&key).await,
            Ok(SaverCommand::Value { source, payload }) => {
                self.engine.on_value(&source, &payload).await.map(|_| ())
            }
            Ok(SaverCommand::Unit { source, unit }) => {
                self.engine.on_unit(&source, &unit).await;
                Ok(())
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.stats.handled += 1;
                true
            }
            Err(e) => {
                self.stats.dropped += 1;
                log_dropped(&e);
                false
            }
        }
    }

    /// Handle one event; `Break` once shutdown was requested
    pub async fn handle_event(&mut self, event: BusEvent) -> ControlFlow<()> {
        match event {
            BusEvent::Message(message) => {
                self.handle(&message).await;
            }
            BusEvent::Reconnected => {
                self.stats.reconnects += 1;
                self.engine.on_reconnect().await;
            }
            BusEvent::Shutdown => {
                log::info!("Dispatcher received shutdown signal");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Run until shutdown or until every sender is dropped
    ///
    /// Flushes the bus before returning the engine so pending publications
    /// get out.
    pub async fn run(mut self, mut rx: mpsc::Receiver<BusEvent>) -> SaverEngine<B> {
        log::info!(
            "🚀 Dispatcher started (system: {}, bus: {})",
            self.engine.system_id(),
            self.engine.bus().name()
        );
        self.start().await;

        while let Some(event) = rx.recv().await {
            if self.handle_event(event).await.is_break() {
                break;
            }
        }

        if let Err(e) = self.engine.flush().await {
            log::error!("❌ Failed to flush bus: {}", e);
        }

        let engine_stats = self.engine.stats();
        log::info!(
            "✅ Dispatcher stopped: {} handled, {} dropped, {} reconnects | {} savers, {} values, {} publications, {} rollovers",
            self.stats.handled,
            self.stats.dropped,
            self.stats.reconnects,
            self.engine.registry().len(),
            engine_stats.values,
            engine_stats.publications,
            engine_stats.rollovers
        );

        self.engine
    }
}

fn log_dropped(err: &SaverError) {
    match err {
        SaverError::MalformedTopic(_) | SaverError::ForeignSystem(_) => log::debug!("Dropped: {}", err),
        SaverError::UnknownSaver(_) => log::info!("Ignored removal: {}", err),
        SaverError::UnknownKind(_) | SaverError::InvalidInterval(_) | SaverError::InvalidValue(_) => {
            log::warn!("⚠️  Dropped: {}", err)
        }
    }
}
