// src/io/test_support.rs
//
// In-memory stand-ins for serial ports used by unit tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::serial::SerialChannel;
use super::types::{Role, StopSignal};

/// Cloneable in-memory writer; every clone appends to the same buffer.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that accepts at most `max` bytes per call and yields between calls,
/// so unsynchronized writers would interleave.
pub struct TrickleWriter {
    out: SharedBuf,
    max: usize,
}

impl TrickleWriter {
    pub fn new(out: SharedBuf, max: usize) -> Self {
        TrickleWriter { out, max: max.max(1) }
    }
}

impl Write for TrickleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.max);
        self.out.write(&buf[..n])?;
        std::thread::yield_now();
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One scripted read result
pub enum Step {
    Data(Vec<u8>),
    /// Run a side effect while the read is in progress, then continue
    /// with the next step in the same call
    Hook(Box<dyn FnMut() + Send>),
    /// Sleep, then report a read timeout
    Pause(Duration),
    Fail(io::ErrorKind),
}

/// Reader that plays back a script, then behaves like an idle port
/// (short sleep + `TimedOut`). Optionally triggers a stop signal once drained.
pub struct ScriptedReader {
    steps: VecDeque<Step>,
    on_drained: Option<StopSignal>,
}

impl ScriptedReader {
    pub fn new(steps: Vec<Step>) -> Self {
        ScriptedReader {
            steps: steps.into(),
            on_drained: None,
        }
    }

    pub fn stop_when_drained(mut self, stop: StopSignal) -> Self {
        self.on_drained = Some(stop);
        self
    }
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.steps.pop_front() {
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.steps.push_front(Step::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Some(Step::Hook(mut hook)) => {
                hook();
                self.read(buf)
            }
            Some(Step::Pause(d)) => {
                std::thread::sleep(d);
                Err(io::ErrorKind::TimedOut.into())
            }
            Some(Step::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
            None => {
                if let Some(stop) = &self.on_drained {
                    stop.trigger();
                }
                std::thread::sleep(Duration::from_millis(2));
                Err(io::ErrorKind::TimedOut.into())
            }
        }
    }
}

/// Channel whose reader plays `chunks` and whose writes land in `out`.
pub fn mock_channel(name: &str, role: Role, chunks: Vec<Vec<u8>>, out: SharedBuf) -> SerialChannel {
    let reader = ScriptedReader::new(chunks.into_iter().map(Step::Data).collect());
    SerialChannel::from_parts(name, role, Box::new(reader), Box::new(out))
}
