//! Line-oriented bridge for running the saver behind a pipe
//!
//! Inbound, one message per line:
//! - `<topic>\t<payload>` (split on the first tab; topics may contain spaces)
//! - `{"topic": "...", "payload": "..."}`
//! - `<topic>` alone, meaning an empty payload
//! - `@reconnect`, telling the saver to re-issue its subscriptions
//!
//! Outbound, one JSON object per operation, e.g.
//! `{"op":"publish","topic":"/devices/energy/controls/Power min","payload":"50","retained":true}`

use crate::bus::{Bus, BusError, BusEvent, BusOp, InboundMessage};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

/// Control line that maps to `BusEvent::Reconnected`
pub const RECONNECT_LINE: &str = "@reconnect";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    Message(InboundMessage),
    Reconnect,
}

impl From<InboundLine> for BusEvent {
    fn from(line: InboundLine) -> Self {
        match line {
            InboundLine::Message(msg) => BusEvent::Message(msg),
            InboundLine::Reconnect => BusEvent::Reconnected,
        }
    }
}

/// Parse one inbound line; blank and undecodable lines yield None
pub fn parse_line(line: &str) -> Option<InboundLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    if line.trim() == RECONNECT_LINE {
        return Some(InboundLine::Reconnect);
    }

    if line.starts_with('{') {
        return match serde_json::from_str::<InboundMessage>(line) {
            Ok(msg) => Some(InboundLine::Message(msg)),
            Err(e) => {
                log::warn!("Skipping undecodable JSON line: {}", e);
                None
            }
        };
    }

    let (topic, payload) = line.split_once('\t').unwrap_or((line, ""));
    Some(InboundLine::Message(InboundMessage::new(topic, payload)))
}

/// Read lines until EOF and forward them as bus events
///
/// Returns the number of events forwarded, or `BusError::Closed` if the
/// receiving side went away first.
pub async fn run_line_reader<R>(reader: R, tx: mpsc::Sender<BusEvent>) -> Result<u64, BusError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0u64;

    while let Some(line) = lines.next_line().await? {
        let Some(parsed) = parse_line(&line) else {
            continue;
        };
        if tx.send(parsed.into()).await.is_err() {
            log::warn!("Dispatcher channel closed, stopping line reader");
            return Err(BusError::Closed);
        }
        forwarded += 1;
    }

    log::info!("Input closed after {} lines", forwarded);
    Ok(forwarded)
}

/// Read stdin on a dedicated thread so a pending read never holds up shutdown
pub fn spawn_stdin_reader(tx: mpsc::Sender<BusEvent>) -> std::thread::JoinHandle<u64> {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut forwarded = 0u64;

        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::error!("Failed to read stdin: {}", e);
                    break;
                }
            };
            let Some(parsed) = parse_line(&line) else {
                continue;
            };
            if tx.blocking_send(parsed.into()).is_err() {
                log::warn!("Dispatcher channel closed, stopping stdin reader");
                break;
            }
            forwarded += 1;
        }

        log::info!("Stdin closed after {} lines", forwarded);
        forwarded
    })
}

/// Bus that writes every operation as a JSON line
pub struct JsonlBus {
    out: BufWriter<Box<dyn Write + Send>>,
    ops_written: u64,
}

impl JsonlBus {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: BufWriter::new(out),
            ops_written: 0,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Append to a file, creating parent directories as needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BusError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(Box::new(file)))
    }

    pub fn ops_written(&self) -> u64 {
        self.ops_written
    }

    fn write_op(&mut self, op: &BusOp) -> Result<(), BusError> {
        let json = serde_json::to_string(op)?;
        writeln!(self.out, "{}", json)?;
        // downstream consumers read line by line
        self.out.flush()?;
        self.ops_written += 1;
        Ok(())
    }
}

#[async_trait]
impl Bus for JsonlBus {
    async fn subscribe(&mut self, filter: &str) -> Result<(), BusError> {
        self.write_op(&BusOp::Subscribe {
            topic: filter.to_string(),
        })
    }

    async fn unsubscribe(&mut self, filter: &str) -> Result<(), BusError> {
        self.write_op(&BusOp::Unsubscribe {
            topic: filter.to_string(),
        })
    }

    async fn publish(&mut self, topic: &str, payload: &str, retained: bool) -> Result<(), BusError> {
        self.write_op(&BusOp::Publish {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retained,
        })
    }

    async fn flush(&mut self) -> Result<(), BusError> {
        self.out.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "JSONL"
    }
}
