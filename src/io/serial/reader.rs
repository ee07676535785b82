// src/io/serial/reader.rs
//
// Output pipeline: one blocking read loop per monitored channel.
// Reads with a bounded timeout, optionally forwards each chunk to the relay
// peer, coalesces bytes into Messages and hands them to the sink.

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use super::channel::ChannelReader;
use super::coalescer::Coalescer;
use crate::io::error::{HextermError, HextermResult};
use crate::io::relay::Forwarder;
use crate::io::types::{Direction, Message, SinkEvent, SinkSender, StopSignal};
use crate::settings::Settings;

/// Everything a read loop needs besides its read half
pub struct ReaderContext {
    pub port: String,
    /// Tag for every Message this loop emits
    pub direction: Direction,
    pub settings: Arc<Settings>,
    /// Relay forwarding handle (MITM mode only)
    pub forward: Option<Forwarder>,
    pub sink: SinkSender,
    pub stop: StopSignal,
}

impl ReaderContext {
    fn emit(&self, bytes: Vec<u8>) {
        let msg = Message::new(
            self.direction,
            bytes,
            self.settings.codec,
            self.settings.timestamps,
        );
        if self.sink.blocking_send(SinkEvent::Message(msg)).is_err() {
            tlog!("[reader:{}] Sink closed, message dropped", self.port);
        }
    }
}

fn is_timeout(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// Blocking read loop.
///
/// Returns when the stop signal is observed or the channel fails. Every byte
/// read before returning is emitted, the last ones in a final flushed Message.
/// On failure the relay (if any) is closed and the stop signal raised before
/// the flush, so the other loops wind down too.
pub fn run_channel_reader(mut reader: ChannelReader, ctx: ReaderContext) -> HextermResult<()> {
    let tuning = &ctx.settings.tuning;
    let mut coalescer = Coalescer::new(tuning.inter_byte_gap(), tuning.max_message_len);
    let mut buf = [0u8; 256];

    tlog!("[reader:{}] Started ({})", ctx.port, ctx.direction);

    let result = loop {
        if ctx.stop.is_set() {
            break Ok(());
        }

        // The forwarding rule is sampled before the read, so a toggle only
        // affects chunks read after it
        let forwarding = ctx.forward.as_ref().is_some_and(|f| f.enabled());

        match reader.read(&mut buf) {
            Ok(0) => {
                // EOF - port closed/disconnected
                break Err(HextermError::port_io(
                    &ctx.port,
                    std::io::Error::new(ErrorKind::UnexpectedEof, "port disconnected"),
                ));
            }
            Ok(n) => {
                let at = Instant::now();
                let read_bytes = &buf[..n];

                // Forward before display
                let forwarded = match &ctx.forward {
                    Some(fwd) => fwd.forward(read_bytes, forwarding),
                    None => Ok(false),
                };

                for chunk in coalescer.feed(read_bytes, at) {
                    ctx.emit(chunk);
                }

                if let Err(e) = forwarded {
                    break Err(e);
                }
            }
            Err(ref e) if is_timeout(e.kind()) => {
                // Timeout is expected for serial reads
            }
            Err(e) => break Err(HextermError::port_io(&ctx.port, e)),
        }

        if let Some(chunk) = coalescer.poll_idle(Instant::now()) {
            ctx.emit(chunk);
        }
    };

    if let Err(ref e) = result {
        tlog!("[reader:{}] Failed: {}", ctx.port, e);
        if let Some(fwd) = &ctx.forward {
            fwd.close_relay();
        }
        ctx.stop.trigger();
    }

    // Emit any remaining data before exit
    if let Some(chunk) = coalescer.flush() {
        ctx.emit(chunk);
    }

    tlog!("[reader:{}] Stopped", ctx.port);
    result
}

/// Run the read loop on a dedicated blocking thread
pub fn spawn_channel_reader(
    reader: ChannelReader,
    ctx: ReaderContext,
) -> JoinHandle<HextermResult<()>> {
    tokio::task::spawn_blocking(move || run_channel_reader(reader, ctx))
}
