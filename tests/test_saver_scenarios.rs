//! End-to-end saver scenarios driven through the dispatcher channel
//!
//! Each test feeds `BusEvent`s into a running dispatcher task over mpsc,
//! shuts it down, and inspects what reached the in-memory bus.

#[cfg(test)]
mod saver_scenario_tests {
    use chrono::{DateTime, Duration, FixedOffset, TimeZone};
    use minmax_saver::bus::{BusEvent, BusOp, InboundMessage, MemoryBus};
    use minmax_saver::saver::{
        next_boundary, Dispatcher, Extreme, SaverEngine, SaverKey, SaverKind,
    };
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    const OWN_ID: &str = "123456-min-max-saver";
    const POWER_MIN: &str = "/devices/energy/controls/Power min";
    const POWER_MAX: &str = "/devices/energy/controls/Power max";

    type Clock = Arc<Mutex<DateTime<FixedOffset>>>;

    /// 2024-05-20 10:15:00 at UTC+2
    fn t0() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 20, 10, 15, 0)
            .unwrap()
    }

    /// Spawn a dispatcher on a memory bus; returns sender, bus handle, clock and task
    fn spawn_saver() -> (
        mpsc::Sender<BusEvent>,
        MemoryBus,
        Clock,
        tokio::task::JoinHandle<SaverEngine<MemoryBus>>,
    ) {
        let bus = MemoryBus::new();
        let clock: Clock = Arc::new(Mutex::new(t0()));
        let clock_fn = clock.clone();
        let engine = SaverEngine::with_clock(
            OWN_ID,
            bus.clone(),
            Box::new(move || *clock_fn.lock().unwrap()),
        );

        let (tx, rx) = mpsc::channel(100);
        let handle = tokio::spawn(Dispatcher::new(engine).run(rx));
        (tx, bus, clock, handle)
    }

    fn msg(topic: &str, payload: &str) -> BusEvent {
        BusEvent::Message(InboundMessage::new(topic, payload))
    }

    fn register(kind: &str, hours: &str) -> BusEvent {
        msg(&format!("/sys/{}/{}/energy/Power", OWN_ID, kind), hours)
    }

    fn value(payload: &str) -> BusEvent {
        msg("/devices/energy/controls/Power", payload)
    }

    /// Send events in order, waiting until the dispatcher has consumed them
    async fn feed(tx: &mpsc::Sender<BusEvent>, events: Vec<BusEvent>) {
        for event in events {
            tx.send(event).await.unwrap();
        }
        // capacity is only fully restored once every queued event was received
        while tx.capacity() < tx.max_capacity() {
            tokio::task::yield_now().await;
        }
        // let the dispatcher finish handling the last received event
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn shutdown(
        tx: mpsc::Sender<BusEvent>,
        handle: tokio::task::JoinHandle<SaverEngine<MemoryBus>>,
    ) -> SaverEngine<MemoryBus> {
        tx.send(BusEvent::Shutdown).await.unwrap();
        handle.await.unwrap()
    }

    #[tokio::test]
    async fn test_startup_subscribes_registration_wildcard() {
        let (tx, bus, _clock, handle) = spawn_saver();
        let engine = shutdown(tx, handle).await;

        assert_eq!(
            bus.ops().first(),
            Some(&BusOp::Subscribe {
                topic: "/sys/123456-min-max-saver/+/+/+".to_string()
            })
        );
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_after_upsert_has_interval_in_seconds() {
        let (tx, _bus, _clock, handle) = spawn_saver();
        tx.send(register("min", "24")).await.unwrap();
        tx.send(register("max", "0.5")).await.unwrap();
        let engine = shutdown(tx, handle).await;

        let min = engine
            .registry()
            .lookup(&SaverKey::new(SaverKind::Min, "energy", "Power"))
            .unwrap();
        assert_eq!(min.reset_interval_secs, 24 * 3600);
        assert_eq!(min.extreme, Extreme::Absent);

        let max = engine
            .registry()
            .lookup(&SaverKey::new(SaverKind::Max, "energy", "Power"))
            .unwrap();
        assert_eq!(max.reset_interval_secs, 1800);
        assert_eq!(max.next_reset_at, next_boundary(1800, t0()));
    }

    #[tokio::test]
    async fn test_reregistration_does_not_truncate_window() {
        let (tx, _bus, clock, handle) = spawn_saver();
        feed(&tx, vec![register("max", "24"), value("31.5")]).await;

        *clock.lock().unwrap() = t0() + Duration::hours(2);
        feed(&tx, vec![register("max", "1")]).await;
        let engine = shutdown(tx, handle).await;

        let entry = engine
            .registry()
            .lookup(&SaverKey::new(SaverKind::Max, "energy", "Power"))
            .unwrap();
        assert_eq!(entry.reset_interval_secs, 3600);
        assert_eq!(entry.next_reset_at, next_boundary(86_400, t0()));
        assert_eq!(entry.extreme.value(), Some(31.5));
    }

    #[tokio::test]
    async fn test_published_extremes_follow_sequence() {
        let (tx, bus, _clock, handle) = spawn_saver();
        let readings = ["12", "7.25", "19", "-2", "0", "19.5", "3"];

        let mut events = vec![register("min", "24"), register("max", "24")];
        events.extend(readings.iter().map(|r| value(r)));
        for event in events {
            tx.send(event).await.unwrap();
        }
        shutdown(tx, handle).await;

        assert_eq!(bus.retained(POWER_MIN), Some("-2".to_string()));
        assert_eq!(bus.retained(POWER_MAX), Some("19.5".to_string()));
        assert_eq!(bus.published_to(POWER_MIN), vec!["12", "7.25", "-2"]);
        assert_eq!(bus.published_to(POWER_MAX), vec!["12", "19", "19.5"]);
    }

    #[tokio::test]
    async fn test_energy_power_min_scenario() {
        let (tx, bus, clock, handle) = spawn_saver();

        feed(&tx, vec![register("min", "24"), value("100")]).await;
        assert_eq!(bus.published_to(POWER_MIN), vec!["100"]);

        *clock.lock().unwrap() = t0() + Duration::hours(6);
        feed(&tx, vec![value("50")]).await;
        assert_eq!(bus.published_to(POWER_MIN), vec!["100", "50"]);

        // next local midnight is 2024-05-21 00:00 +02:00
        *clock.lock().unwrap() = t0() + Duration::hours(14);
        feed(&tx, vec![value("80")]).await;
        shutdown(tx, handle).await;

        assert_eq!(bus.published_to(POWER_MIN), vec!["100", "50", "80"]);
        assert_eq!(bus.retained(POWER_MIN), Some("80".to_string()));
    }

    #[tokio::test]
    async fn test_idle_saver_only_rolls_on_next_value() {
        let (tx, _bus, clock, handle) = spawn_saver();
        feed(&tx, vec![register("min", "1"), value("5")]).await;

        // hours pass without traffic; nothing happens until a value arrives
        *clock.lock().unwrap() = t0() + Duration::hours(5);
        feed(&tx, vec![msg("/devices/energy/controls/Power/meta/unit", "W")]).await;
        let engine = shutdown(tx, handle).await;

        let entry = engine
            .registry()
            .lookup(&SaverKey::new(SaverKind::Min, "energy", "Power"))
            .unwrap();
        assert_eq!(entry.extreme.value(), Some(5.0));
        assert_eq!(entry.next_reset_at, next_boundary(3600, t0()));
    }

    #[tokio::test]
    async fn test_unit_reaches_both_savers() {
        let (tx, bus, _clock, handle) = spawn_saver();
        tx.send(register("min", "24")).await.unwrap();
        tx.send(register("max", "24")).await.unwrap();
        tx.send(msg("/devices/energy/controls/Power/meta/unit", "W")).await.unwrap();
        shutdown(tx, handle).await;

        assert_eq!(bus.published_to("/devices/energy/controls/Power min/meta/unit"), vec!["W"]);
        assert_eq!(bus.published_to("/devices/energy/controls/Power max/meta/unit"), vec!["W"]);
    }

    #[tokio::test]
    async fn test_unit_without_saver_publishes_nothing() {
        let (tx, bus, _clock, handle) = spawn_saver();
        tx.send(msg("/devices/energy/controls/Power/meta/unit", "W")).await.unwrap();
        shutdown(tx, handle).await;

        assert!(bus.publications().is_empty());
    }

    #[tokio::test]
    async fn test_removal_tombstones_and_forgets_saver() {
        let (tx, bus, _clock, handle) = spawn_saver();
        feed(
            &tx,
            vec![
                register("max", "24"),
                value("42"),
                msg("/devices/energy/controls/Power/meta/unit", "W"),
            ],
        )
        .await;
        bus.take_ops();

        tx.send(register("max", "")).await.unwrap();
        let engine = shutdown(tx, handle).await;

        assert_eq!(bus.published_to(POWER_MAX), vec![""]);
        assert_eq!(bus.published_to("/devices/energy/controls/Power max/meta/unit"), vec![""]);
        assert_eq!(bus.retained(POWER_MAX), None);
        assert!(!bus.is_subscribed("/devices/energy/controls/Power"));
        assert!(engine
            .registry()
            .lookup(&SaverKey::new(SaverKind::Max, "energy", "Power"))
            .is_none());
    }

    #[tokio::test]
    async fn test_bad_input_never_stops_the_dispatcher() {
        let (tx, bus, _clock, handle) = spawn_saver();
        for event in [
            msg("/weather/today", "sunny"),
            msg("/sys/someone-else/min/energy/Power", "24"),
            register("avg", "24"),
            register("min", "tomorrow"),
            register("min", ""),
            register("min", "24"),
            value("not a number"),
            value("9"),
        ] {
            tx.send(event).await.unwrap();
        }
        let engine = shutdown(tx, handle).await;

        assert_eq!(engine.registry().len(), 1);
        assert_eq!(bus.published_to(POWER_MIN), vec!["9"]);
    }

    #[tokio::test]
    async fn test_reconnect_reissues_subscriptions() {
        let (tx, bus, _clock, handle) = spawn_saver();
        feed(&tx, vec![register("min", "24")]).await;

        bus.drop_subscriptions();
        tx.send(BusEvent::Reconnected).await.unwrap();
        shutdown(tx, handle).await;

        assert!(bus.is_subscribed("/sys/123456-min-max-saver/+/+/+"));
        assert!(bus.is_subscribed("/devices/energy/controls/Power"));
        assert!(bus.is_subscribed("/devices/energy/controls/Power/meta/unit"));
    }

    #[tokio::test]
    async fn test_closed_channel_stops_dispatcher() {
        let (tx, _bus, _clock, handle) = spawn_saver();
        tx.send(register("min", "24")).await.unwrap();
        drop(tx);

        let engine = handle.await.unwrap();
        assert_eq!(engine.registry().len(), 1);
    }
}
