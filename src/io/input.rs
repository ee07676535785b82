// src/io/input.rs
//
// Input pipeline: turns operator or script lines into commands or byte
// payloads, dispatches payloads to the right channel and echoes them to the
// sink. Parse errors are reported and the line dropped; reading continues.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::codec::{self, CodecSpec};
use super::error::{HextermError, HextermResult};
use super::relay::RelayState;
use super::serial::ChannelWriter;
use super::sink;
use super::types::{Direction, Message, Role, SinkEvent, SinkSender, StopSignal};
use crate::settings::Settings;

/// Prefix routing a MITM-mode line to the DTE channel
pub const DTE_MARKER: char = 't';

pub const HELP_TEXT: &str = "\
commands:
  help | ?              show this help
  quit | q | exit       stop and exit
  forward [on|off]      toggle or set relay forwarding (MITM mode)
  status                show mode and relay state
data:
  48 65 6c              hex bytes, two digits each
  \"text\"                string literal, encoded with the active codec
  t48 65                (MITM) send to the DTE instead of the DCE
  # comment             ignored
  lines from a log file are replayed using their hex field";

// ============================================================================
// Line Parsing
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    /// `None` toggles
    Forward(Option<bool>),
    Status,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputLine {
    /// Blank or comment
    Skip,
    Command(Command),
    /// Bytes to send; `to` is `None` in single-channel mode
    Data { to: Option<Role>, bytes: Vec<u8> },
}

fn parse_command(line: &str) -> HextermResult<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(keyword) = words.next() else {
        return Ok(None);
    };
    let command = match keyword.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        "status" => Command::Status,
        "forward" | "fwd" => match words.next().map(|w| w.to_ascii_lowercase()) {
            None => Command::Forward(None),
            Some(w) if w == "on" => Command::Forward(Some(true)),
            Some(w) if w == "off" => Command::Forward(Some(false)),
            Some(w) => {
                return Err(HextermError::input_parse(2, &w, "expected on or off"));
            }
        },
        _ => return Ok(None),
    };
    Ok(Some(command))
}

/// A line is a log replay only if its first field holds no string literal;
/// `"a | RX | b"` and `t"a | RX | b"` stay operator data.
fn replayed_log_line(line: &str) -> Option<(Direction, &str)> {
    let head = line.split(sink::FIELD_DELIMITER).next().unwrap_or(line);
    if head.contains('"') {
        return None;
    }
    sink::parse_log_line(line)
}

/// Interpret one input line.
pub fn parse_line(line: &str, codec: CodecSpec, mitm: bool) -> HextermResult<InputLine> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(InputLine::Skip);
    }

    if let Some(command) = parse_command(line)? {
        return Ok(InputLine::Command(command));
    }

    // Replayed log line: only the tag (for routing) and hex field matter
    if let Some((direction, hex)) = replayed_log_line(line) {
        let bytes = codec::encode(codec, hex)?;
        let to = mitm.then(|| direction.destination().unwrap_or(Role::Dce));
        return Ok(InputLine::Data { to, bytes });
    }

    if mitm {
        let (to, body) = match line.strip_prefix(|c: char| c.eq_ignore_ascii_case(&DTE_MARKER)) {
            Some(rest) => (Role::Dte, rest),
            None => (Role::Dce, line),
        };
        return Ok(InputLine::Data {
            to: Some(to),
            bytes: codec::encode(codec, body)?,
        });
    }

    Ok(InputLine::Data {
        to: None,
        bytes: codec::encode(codec, line)?,
    })
}

// ============================================================================
// Dispatch
// ============================================================================

/// Where payloads go
#[derive(Clone, Debug)]
pub enum Dispatch {
    Single(ChannelWriter),
    Relay(Arc<RelayState>),
}

impl Dispatch {
    /// Write `bytes` and return the tag for the echoed Message.
    pub fn send(&self, to: Option<Role>, bytes: &[u8]) -> HextermResult<Direction> {
        match self {
            Dispatch::Single(writer) => {
                writer.write_all(bytes)?;
                Ok(Direction::Sent)
            }
            Dispatch::Relay(relay) => {
                let target = to.unwrap_or(Role::Dce);
                relay.inject(target, bytes)?;
                Ok(Direction::injected_to(target))
            }
        }
    }

    fn relay(&self) -> Option<&RelayState> {
        match self {
            Dispatch::Relay(relay) => Some(relay),
            Dispatch::Single(_) => None,
        }
    }
}

// ============================================================================
// Input Loop
// ============================================================================

/// How the input loop ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputOutcome {
    EndOfInput,
    Quit,
    /// The stop signal was raised elsewhere
    Stopped,
}

pub struct InputContext {
    /// Name of the input source, for error reports
    pub source: String,
    pub settings: Arc<Settings>,
    pub dispatch: Dispatch,
    pub sink: SinkSender,
    pub stop: StopSignal,
}

impl InputContext {
    async fn notice(&self, text: impl Into<String>) {
        let _ = self.sink.send(SinkEvent::Notice(text.into())).await;
    }

    async fn handle_command(&self, command: Command) {
        match (command, self.dispatch.relay()) {
            (Command::Help, _) => self.notice(HELP_TEXT).await,
            (Command::Quit, _) => {}
            (Command::Forward(_), None) => {
                self.notice("forwarding only applies in MITM mode").await
            }
            (Command::Forward(setting), Some(relay)) => {
                let on = match setting {
                    Some(on) => {
                        relay.set_forwarding(on);
                        on
                    }
                    None => relay.toggle_forwarding(),
                };
                self.notice(format!("forwarding {}", if on { "on" } else { "off" }))
                    .await
            }
            (Command::Status, None) => {
                self.notice(format!(
                    "single-channel mode on {}, codec {}",
                    self.settings.port.name, self.settings.codec
                ))
                .await
            }
            (Command::Status, Some(relay)) => {
                self.notice(format!(
                    "MITM mode, relay {}, forwarding {}, codec {}",
                    relay.phase(),
                    if relay.forwarding() { "on" } else { "off" },
                    self.settings.codec
                ))
                .await
            }
        }
    }

    /// Write on a blocking thread and echo the payload as a Message.
    async fn transmit(&self, to: Option<Role>, bytes: Vec<u8>) -> HextermResult<()> {
        let dispatch = self.dispatch.clone();
        let (direction, bytes) = tokio::task::spawn_blocking(move || {
            dispatch.send(to, &bytes).map(|d| (d, bytes))
        })
        .await
        .map_err(|e| {
            HextermError::port_io(
                &self.settings.port.name,
                std::io::Error::other(format!("write task failed: {}", e)),
            )
        })??;

        let msg = Message::new(direction, bytes, self.settings.codec, self.settings.timestamps);
        let _ = self.sink.send(SinkEvent::Message(msg)).await;
        Ok(())
    }
}

/// Read lines until end of input, `quit`, the stop signal, or a write failure.
pub async fn run_input<R>(reader: R, ctx: InputContext) -> HextermResult<InputOutcome>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mitm = ctx.settings.is_mitm();
    let mut line_no = 0usize;

    loop {
        let next = tokio::select! {
            _ = ctx.stop.wait() => return Ok(InputOutcome::Stopped),
            next = lines.next_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => {
                tlog!("[input] End of input from {} after {} lines", ctx.source, line_no);
                return Ok(InputOutcome::EndOfInput);
            }
            Err(e) => {
                return Err(HextermError::File {
                    path: ctx.source.clone(),
                    source: e,
                });
            }
        };
        line_no += 1;

        match parse_line(&line, ctx.settings.codec, mitm) {
            Ok(InputLine::Skip) => {}
            Ok(InputLine::Command(Command::Quit)) => return Ok(InputOutcome::Quit),
            Ok(InputLine::Command(command)) => ctx.handle_command(command).await,
            Ok(InputLine::Data { bytes, .. }) if bytes.is_empty() => {}
            Ok(InputLine::Data { to, bytes }) => {
                if let Err(e) = ctx.transmit(to, bytes).await {
                    ctx.notice(format!("{}: {}", ctx.source, e)).await;
                    ctx.stop.trigger();
                    return Err(e);
                }
            }
            Err(e) => {
                ctx.notice(format!("{} line {}: {} (line dropped: {:?})", ctx.source, line_no, e, line))
                    .await;
            }
        }
    }
}
