//! Min/max saver runtime
//!
//! Wires the dispatcher to the stdio bus:
//! - reads inbound messages (`<topic>\t<payload>` or JSON) from stdin or SAVER_INPUT
//! - writes subscribe/unsubscribe/publish operations as JSON lines to stdout or SAVER_OUTPUT
//! - logs to stderr
//!
//! Usage:
//!   mosquitto_sub -v -t '/sys/#' -t '/devices/#' -F '%t\t%p' | min_max_saver --system-id 123456-min-max-saver
//!
//! Environment variables:
//!   SAVER_SYSTEM_ID - Own system id (required unless --system-id is given)
//!   SAVER_CHANNEL_BUFFER - Inbound channel size (default: 1000)
//!   SAVER_SHUTDOWN_GRACE_MS - Time allowed for pending publications on shutdown (default: 2000)
//!   SAVER_INPUT / SAVER_OUTPUT - File paths instead of stdin/stdout (default: -)

use dotenv::dotenv;
use log::{error, info, warn};
use minmax_saver::bus::{run_line_reader, spawn_stdin_reader, BusEvent, JsonlBus};
use minmax_saver::config::{usage, CliArgs, SaverConfig, STDIO};
use minmax_saver::saver::{Dispatcher, SaverEngine};
use std::env;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let program = env::args().next().unwrap_or_else(|| "min_max_saver".to_string());
    let args = CliArgs::parse(env::args().skip(1)).map_err(|e| {
        eprintln!("{}\n\n{}", e, usage(&program));
        e
    })?;

    if args.help {
        eprintln!("{}", usage(&program));
        return Ok(());
    }

    let config = SaverConfig::from_env(&args)?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_filter()))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting min/max saver");
    info!("   ├─ System ID: {}", config.system_id);
    info!("   ├─ Channel buffer: {} events", config.channel_buffer);
    info!("   ├─ Shutdown grace: {}ms", config.shutdown_grace_ms);
    info!("   ├─ Input: {}", if config.input == STDIO { "stdin" } else { config.input.as_str() });
    info!("   └─ Output: {}", if config.output == STDIO { "stdout" } else { config.output.as_str() });

    let bus = if config.output == STDIO {
        JsonlBus::stdout()
    } else {
        JsonlBus::open(&config.output)?
    };

    // Single ordered channel: every inbound event goes through the dispatcher
    let (tx, rx) = mpsc::channel::<BusEvent>(config.channel_buffer);

    let engine = SaverEngine::new(config.system_id.clone(), bus);
    let mut dispatcher_handle = tokio::spawn(Dispatcher::new(engine).run(rx));

    if config.input == STDIO {
        // detached: a blocked stdin read must not hold up process exit
        let _ = spawn_stdin_reader(tx.clone());
    } else {
        let file = tokio::fs::File::open(&config.input).await?;
        let reader_tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = run_line_reader(BufReader::new(file), reader_tx).await {
                warn!("⚠️  Input reader stopped: {}", e);
            }
        });
    }

    info!("🔄 Press CTRL+C to shutdown gracefully");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
                Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
            }
        }
        result = &mut dispatcher_handle => {
            // only happens if the dispatcher task died
            if let Err(e) = result {
                error!("❌ Dispatcher task failed: {}", e);
            }
            return Ok(());
        }
    }

    // Ask the dispatcher to stop after what is already queued, then give it
    // a bounded amount of time to flush
    let grace = Duration::from_millis(config.shutdown_grace_ms);
    if timeout(grace, tx.send(BusEvent::Shutdown)).await.is_err() {
        warn!("⚠️  Event channel full, dispatcher will be stopped without draining");
    }
    drop(tx);

    match timeout(grace, &mut dispatcher_handle).await {
        Ok(Ok(engine)) => info!(
            "✅ Min/max saver stopped ({} savers, {} publications)",
            engine.registry().len(),
            engine.stats().publications
        ),
        Ok(Err(e)) => error!("❌ Dispatcher task failed: {}", e),
        Err(_) => {
            warn!("⚠️  Grace period elapsed, pending publications dropped");
            dispatcher_handle.abort();
        }
    }

    Ok(())
}
