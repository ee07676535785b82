// src/io/serial/channel.rs
//
// An open serial channel split into a read half, owned by exactly one read
// loop, and a write half shared behind a per-channel lock so forwarded and
// injected writes never interleave.

use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::utils::{
    to_serialport_data_bits, to_serialport_flow_control, to_serialport_parity,
    to_serialport_stop_bits, FlowControl, Framing,
};
use crate::io::error::{HextermError, HextermResult};
use crate::io::types::Role;

/// Read half of a channel. Reads must time out (`ErrorKind::TimedOut` or
/// `WouldBlock`) so the owning loop can observe shutdown.
pub type ChannelReader = Box<dyn Read + Send>;

// ============================================================================
// Port Settings
// ============================================================================

/// Everything needed to open one serial port
#[derive(Clone, Debug, PartialEq)]
pub struct PortSettings {
    pub name: String,
    pub baud_rate: u32,
    pub framing: Framing,
    pub flow_control: FlowControl,
}

impl fmt::Display for PortSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} baud ({}, flow: {})",
            self.name, self.baud_rate, self.framing, self.flow_control
        )
    }
}

// ============================================================================
// Write Half
// ============================================================================

/// Shared, lock-protected write half of a channel
#[derive(Clone)]
pub struct ChannelWriter {
    port: String,
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl ChannelWriter {
    pub fn new(port: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        ChannelWriter {
            port: port.into(),
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write the whole buffer and flush while holding the channel's write lock.
    pub fn write_all(&self, bytes: &[u8]) -> HextermResult<()> {
        let mut guard = self.inner.lock().map_err(|e| {
            HextermError::port_io(
                &self.port,
                std::io::Error::other(format!("write lock poisoned: {}", e)),
            )
        })?;
        guard
            .write_all(bytes)
            .and_then(|_| guard.flush())
            .map_err(|e| HextermError::port_io(&self.port, e))
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

impl fmt::Debug for ChannelWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelWriter").field("port", &self.port).finish()
    }
}

// ============================================================================
// Serial Channel
// ============================================================================

/// An open serial connection
pub struct SerialChannel {
    port: String,
    role: Role,
    reader: Option<ChannelReader>,
    writer: ChannelWriter,
}

impl SerialChannel {
    /// Build a channel from an already-open read/write pair
    pub fn from_parts(
        port: impl Into<String>,
        role: Role,
        reader: ChannelReader,
        writer: Box<dyn Write + Send>,
    ) -> Self {
        let port = port.into();
        SerialChannel {
            writer: ChannelWriter::new(port.clone(), writer),
            port,
            role,
            reader: Some(reader),
        }
    }

    /// Open a serial port through the driver.
    ///
    /// Mark/space parity and 1.5 stop bits parse as valid framing but the
    /// serialport driver cannot express them, so they fail here.
    pub fn open(settings: &PortSettings, role: Role, read_timeout: Duration) -> HextermResult<Self> {
        let name = &settings.name;
        let framing = settings.framing;

        let parity = to_serialport_parity(framing.parity).ok_or_else(|| {
            HextermError::port_open(name, format!("parity in {} is not supported by the serial driver", framing))
        })?;
        let stop_bits = to_serialport_stop_bits(framing.stop_bits).ok_or_else(|| {
            HextermError::port_open(name, format!("stop bits in {} are not supported by the serial driver", framing))
        })?;
        let data_bits = to_serialport_data_bits(framing.data_bits).ok_or_else(|| {
            HextermError::port_open(name, format!("data bits in {} are not supported", framing))
        })?;

        let port = serialport::new(name, settings.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(to_serialport_flow_control(settings.flow_control))
            .timeout(read_timeout)
            .open()
            .map_err(|e| HextermError::port_open(name, e))?;

        let writer = port.try_clone().map_err(|e| HextermError::port_open(name, e))?;

        tlog!("[channel:{}] Opened {}", role, settings);

        Ok(SerialChannel::from_parts(name.clone(), role, Box::new(port), Box::new(writer)))
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn writer(&self) -> ChannelWriter {
        self.writer.clone()
    }

    /// Hand the read half to its read loop. Returns `None` if already taken.
    pub fn take_reader(&mut self) -> Option<ChannelReader> {
        self.reader.take()
    }
}

impl fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialChannel")
            .field("port", &self.port)
            .field("role", &self.role)
            .field("reader_taken", &self.reader.is_none())
            .finish()
    }
}

// ============================================================================
// Port Listing
// ============================================================================

/// Information about an available serial port
#[derive(Clone, Debug)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

/// List available serial ports
///
/// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
/// The tty devices block on open waiting for carrier detect.
pub fn list_serial_ports() -> HextermResult<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| HextermError::port_open("(enumeration)", e))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    "USB".to_string(),
                    info.manufacturer,
                    info.product,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None, None, None, None),
                serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None, None, None),
                serialport::SerialPortType::Unknown => ("Unknown".to_string(), None, None, None, None),
            };
            SerialPortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
                vid,
                pid,
            }
        })
        .collect())
}
