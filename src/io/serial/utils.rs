// src/io/serial/utils.rs
//
// Line settings for serial channels: framing strings, parity, stop bits and
// flow control, plus conversion to the serialport crate's types.

use std::fmt;
use std::str::FromStr;

use serialport::{DataBits, FlowControl as SpFlowControl, Parity as SpParity, StopBits as SpStopBits};

use crate::io::error::HextermError;

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parity {
    Even,
    Mark,
    #[default]
    None,
    Odd,
    Space,
}

/// Stop bit count for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

/// Flow control method, delegated to the driver
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlowControl {
    #[default]
    None,
    Hardware,
    Software,
}

/// Data bits, parity and stop bits, written as e.g. `8N1` or `7E1.5`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Framing {
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for Framing {
    fn default() -> Self {
        Framing {
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

impl FromStr for Framing {
    type Err = HextermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || {
            HextermError::config(format!(
                "invalid framing \"{}\" (expected <5-8><E|N|M|O|S><1|1.5|2>, e.g. 8N1)",
                s
            ))
        };

        let mut chars = s.chars();
        let data_bits = match chars.next() {
            Some(c @ '5'..='8') => c as u8 - b'0',
            _ => return Err(bad()),
        };
        let parity = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('E') => Parity::Even,
            Some('M') => Parity::Mark,
            Some('N') => Parity::None,
            Some('O') => Parity::Odd,
            Some('S') => Parity::Space,
            _ => return Err(bad()),
        };
        let stop_bits = match chars.as_str() {
            "1" => StopBits::One,
            "1.5" => StopBits::OnePointFive,
            "2" => StopBits::Two,
            _ => return Err(bad()),
        };

        Ok(Framing {
            data_bits,
            parity,
            stop_bits,
        })
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Space => 'S',
        };
        let stop = match self.stop_bits {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        write!(f, "{}{}{}", self.data_bits, parity, stop)
    }
}

impl FromStr for FlowControl {
    type Err = HextermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(FlowControl::None),
            "hardware" | "h" | "rtscts" => Ok(FlowControl::Hardware),
            "software" | "s" | "xonxoff" => Ok(FlowControl::Software),
            other => Err(HextermError::config(format!(
                "invalid flow control \"{}\" (expected none, hardware or software)",
                other
            ))),
        }
    }
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowControl::None => "none",
            FlowControl::Hardware => "hardware",
            FlowControl::Software => "software",
        })
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert our Parity enum to serialport crate's Parity type.
/// Mark and space parity have no serialport equivalent.
pub fn to_serialport_parity(p: Parity) -> Option<SpParity> {
    match p {
        Parity::None => Some(SpParity::None),
        Parity::Odd => Some(SpParity::Odd),
        Parity::Even => Some(SpParity::Even),
        Parity::Mark | Parity::Space => None,
    }
}

/// Convert data bits count to serialport crate's DataBits type
pub fn to_serialport_data_bits(bits: u8) -> Option<DataBits> {
    match bits {
        5 => Some(DataBits::Five),
        6 => Some(DataBits::Six),
        7 => Some(DataBits::Seven),
        8 => Some(DataBits::Eight),
        _ => None,
    }
}

/// Convert stop bits to serialport crate's StopBits type. 1.5 is not supported by the driver.
pub fn to_serialport_stop_bits(bits: StopBits) -> Option<SpStopBits> {
    match bits {
        StopBits::One => Some(SpStopBits::One),
        StopBits::Two => Some(SpStopBits::Two),
        StopBits::OnePointFive => None,
    }
}

pub fn to_serialport_flow_control(flow: FlowControl) -> SpFlowControl {
    match flow {
        FlowControl::None => SpFlowControl::None,
        FlowControl::Hardware => SpFlowControl::Hardware,
        FlowControl::Software => SpFlowControl::Software,
    }
}

// ============================================================================
// Tests
// ============================================================================
