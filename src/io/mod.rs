// src/io/mod.rs
//
// Serial I/O, byte codecs, the input and output pipelines and the MITM relay.

pub mod codec;
pub(crate) mod error;
pub mod input;
pub mod relay;
pub mod serial;
pub mod sink;
pub(crate) mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{HextermError, HextermResult};
pub use types::{Direction, Message, Role, SinkEvent, SinkSender, StopSignal};
