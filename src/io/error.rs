// src/io/error.rs
//
// Error taxonomy for the terminal and relay engine.
// Configuration and port-open errors are fatal at startup, channel I/O errors
// are fatal for the session (after a flush), parse errors are recoverable.

use std::path::Path;
use thiserror::Error;

/// Errors raised by configuration, serial channels and the input pipeline.
#[derive(Debug, Error)]
pub enum HextermError {
    /// Invalid framing string, baud rate, flow-control token, codec name or tuning value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required serial port could not be opened.
    #[error("Failed to open {port}: {reason}")]
    PortOpen {
        /// Port name as given by the operator.
        port: String,
        /// Driver-provided reason.
        reason: String,
    },

    /// Read or write failure on an open channel.
    #[error("I/O error on {port}: {source}")]
    PortIo {
        /// Port name of the failing channel.
        port: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed token in an operator or script line.
    #[error("Token {position} ({token:?}): {reason}")]
    InputParse {
        /// 1-based token position within the line.
        position: usize,
        /// The offending token text.
        token: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Log, script or tuning file could not be opened or read.
    #[error("File error on {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl HextermError {
    pub fn config(msg: impl Into<String>) -> Self {
        HextermError::Config(msg.into())
    }

    pub fn port_open(port: &str, reason: impl ToString) -> Self {
        HextermError::PortOpen {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn port_io(port: &str, source: std::io::Error) -> Self {
        HextermError::PortIo {
            port: port.to_string(),
            source,
        }
    }

    pub fn input_parse(position: usize, token: &str, reason: impl Into<String>) -> Self {
        HextermError::InputParse {
            position,
            token: token.to_string(),
            reason: reason.into(),
        }
    }

    pub fn file(path: &Path, source: std::io::Error) -> Self {
        HextermError::File {
            path: path.display().to_string(),
            source,
        }
    }

    /// Process exit code for an error that ends the session.
    pub fn exit_code(&self) -> u8 {
        match self {
            HextermError::Config(_) => 2,
            HextermError::PortOpen { .. } => 3,
            HextermError::PortIo { .. } => 4,
            HextermError::InputParse { .. } | HextermError::File { .. } => 1,
        }
    }
}

pub type HextermResult<T> = Result<T, HextermError>;
