// src/settings.rs
//
// Session context built once at startup and shared by every component.
// Port/codec choices come from the command line; coalescing and timing
// knobs can be overridden from a TOML tuning file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::io::codec::CodecSpec;
use crate::io::error::{HextermError, HextermResult};
use crate::io::serial::PortSettings;

// ============================================================================
// Tuning
// ============================================================================

/// Upper bound for `max_message_len`; also the widest rendered hex row
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Upper bound for `queue_capacity`
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Upper bound for the millisecond timing knobs
pub const MAX_TIMING_MS: u64 = 60_000;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Tuning {
    /// Coalescing threshold: a gap this long between bytes starts a new Message
    #[serde(default = "default_inter_byte_gap_ms")]
    pub inter_byte_gap_ms: u64,
    /// Coalescing cap: a Message never holds more bytes than this
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    /// Per-read timeout; bounds how long a read loop takes to notice shutdown
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Depth of the sink queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_inter_byte_gap_ms() -> u64 {
    20
}

fn default_max_message_len() -> usize {
    16
}

fn default_read_timeout_ms() -> u64 {
    50
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for Tuning {
    fn default() -> Self {
        Tuning {
            inter_byte_gap_ms: default_inter_byte_gap_ms(),
            max_message_len: default_max_message_len(),
            read_timeout_ms: default_read_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Tuning {
    pub fn inter_byte_gap(&self) -> Duration {
        Duration::from_millis(self.inter_byte_gap_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    fn validate(self) -> HextermResult<Self> {
        check_range("inter_byte_gap_ms", self.inter_byte_gap_ms, MAX_TIMING_MS)?;
        check_range("max_message_len", self.max_message_len as u64, MAX_MESSAGE_LEN as u64)?;
        check_range("read_timeout_ms", self.read_timeout_ms, MAX_TIMING_MS)?;
        check_range("queue_capacity", self.queue_capacity as u64, MAX_QUEUE_CAPACITY as u64)?;
        Ok(self)
    }
}

fn check_range(key: &str, value: u64, max: u64) -> HextermResult<()> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(HextermError::config(format!(
            "{} must be between 1 and {}, got {}",
            key, max, value
        )))
    }
}

/// Parse and validate a TOML tuning document
pub fn parse_tuning(text: &str) -> HextermResult<Tuning> {
    let tuning: Tuning = toml::from_str(text)
        .map_err(|e| HextermError::config(format!("invalid tuning file: {}", e)))?;
    tuning.validate()
}

/// Load the tuning file at `path`
pub fn load_tuning(path: &Path) -> HextermResult<Tuning> {
    let text = std::fs::read_to_string(path).map_err(|e| HextermError::file(path, e))?;
    parse_tuning(&text)
}

// ============================================================================
// Settings
// ============================================================================

/// Validated configuration for one session
#[derive(Debug, Clone)]
pub struct Settings {
    /// Primary port; the DCE side in MITM mode
    pub port: PortSettings,
    /// MITM peer port (DTE side). `Some` enables the relay.
    pub peer: Option<PortSettings>,
    /// Whether the relay cross-writes between the two ports at startup
    pub forwarding: bool,
    pub codec: CodecSpec,
    pub timestamps: bool,
    /// Input script; stdin when `None`
    pub input: Option<PathBuf>,
    /// Message log file
    pub output: Option<PathBuf>,
    pub tuning: Tuning,
}

impl Settings {
    pub fn with_port(port: PortSettings) -> Self {
        Settings {
            port,
            peer: None,
            forwarding: true,
            codec: CodecSpec::default(),
            timestamps: true,
            input: None,
            output: None,
            tuning: Tuning::default(),
        }
    }

    pub fn is_mitm(&self) -> bool {
        self.peer.is_some()
    }
}
