// src/io/sink.rs
//
// Single-writer sink. Owns the console and the optional log file; every
// Message and notice passes through one queue and is written whole, so lines
// from different loops never interleave.
//
// Line format (console and log):
//   [timestamp | ]TAG | hex groups | decoded text

use std::io::Write;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::{Direction, Message, SinkEvent};
use crate::settings::MAX_MESSAGE_LEN;

/// Field delimiter of the line format
pub const FIELD_DELIMITER: &str = " | ";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Render one Message as a line (without trailing newline).
/// The hex field is padded to the width of a full `row_len`-byte row
/// (at most `MAX_MESSAGE_LEN` bytes wide).
pub fn format_message(msg: &Message, row_len: usize) -> String {
    let hex_width = row_len.clamp(1, MAX_MESSAGE_LEN) * 3 - 1;
    let mut line = String::new();
    if let Some(ts) = msg.timestamp() {
        line.push_str(&ts.format(TIMESTAMP_FORMAT).to_string());
        line.push_str(FIELD_DELIMITER);
    }
    line.push_str(&format!("{:<7}", msg.direction().label()));
    line.push_str(FIELD_DELIMITER);
    line.push_str(&format!("{:<width$}", msg.hex(), width = hex_width));
    line.push_str(FIELD_DELIMITER);
    line.push_str(msg.text());
    line
}

/// Split a line in the log format into its direction tag and hex field.
/// Returns `None` if the line is not in the log format.
pub fn parse_log_line(line: &str) -> Option<(Direction, &str)> {
    if !line.contains(FIELD_DELIMITER) {
        return None;
    }
    let fields: Vec<&str> = line.splitn(4, FIELD_DELIMITER).collect();
    match fields.as_slice() {
        [tag, hex, ..] if Direction::from_label(tag).is_some() => {
            Direction::from_label(tag).map(|d| (d, hex.trim()))
        }
        [_ts, tag, hex, ..] => Direction::from_label(tag).map(|d| (d, hex.trim())),
        _ => None,
    }
}

/// The single writer for console and log output
pub struct Sink {
    console: Box<dyn Write + Send>,
    log: Option<Box<dyn Write + Send>>,
    row_len: usize,
}

impl Sink {
    pub fn new(console: Box<dyn Write + Send>, log: Option<Box<dyn Write + Send>>, row_len: usize) -> Self {
        Sink { console, log, row_len }
    }

    /// Write one event. Console failures are reported; a failing log file is
    /// reported once and then dropped so the console keeps working.
    pub fn write_event(&mut self, event: &SinkEvent) {
        match event {
            SinkEvent::Message(msg) => {
                let line = format_message(msg, self.row_len);
                if let Err(e) = writeln!(self.console, "{}", line).and_then(|_| self.console.flush()) {
                    tlog!("[sink] Console write failed: {}", e);
                }
                if let Some(log) = self.log.as_mut() {
                    if let Err(e) = writeln!(log, "{}", line).and_then(|_| log.flush()) {
                        tlog!("[sink] Log write failed, logging disabled: {}", e);
                        let _ = writeln!(self.console, "*** log file write failed: {}", e);
                        self.log = None;
                    }
                }
            }
            SinkEvent::Notice(text) => {
                if let Err(e) = writeln!(self.console, "*** {}", text).and_then(|_| self.console.flush()) {
                    tlog!("[sink] Console write failed: {}", e);
                }
            }
        }
    }

    /// Drain the queue until every sender is gone.
    pub fn run(mut self, mut rx: mpsc::Receiver<SinkEvent>) {
        let mut written = 0usize;
        while let Some(event) = rx.blocking_recv() {
            self.write_event(&event);
            written += 1;
        }
        if let Some(log) = self.log.as_mut() {
            let _ = log.flush();
        }
        tlog!("[sink] Drained ({} events)", written);
    }

    /// Run the sink on a dedicated blocking thread
    pub fn spawn(self, rx: mpsc::Receiver<SinkEvent>) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || self.run(rx))
    }
}
