// src/io/serial/mod.rs
//
// Serial port driver for the terminal.
//
// Features:
// - Framing, baud and flow-control parsing (utils)
// - Split read/write channels with a locked write half (channel)
// - Blocking read loops with message coalescing (reader, coalescer)

mod channel;
mod coalescer;
mod reader;
pub(crate) mod utils;

pub use channel::{list_serial_ports, ChannelReader, ChannelWriter, PortSettings, SerialChannel, SerialPortInfo};
pub use coalescer::Coalescer;
pub use reader::{run_channel_reader, spawn_channel_reader, ReaderContext};
pub use utils::{FlowControl, Framing, Parity, StopBits};
