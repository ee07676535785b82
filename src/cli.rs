//! Command-line interface for hexterm.
//!
//! Uses clap's derive API. Framing, flow control and codec arrive as strings
//! and are validated in [`Cli::into_settings`] so every bad value surfaces as
//! a configuration error with the same exit code.

use clap::Parser;
use std::path::PathBuf;

use crate::io::codec::CodecSpec;
use crate::io::serial::{FlowControl, Framing, PortSettings};
use crate::io::{HextermError, HextermResult};
use crate::settings::{load_tuning, Settings, Tuning};

/// Raw hexadecimal serial terminal.
///
/// Shows every byte received on a serial port as hex and decoded text, and
/// sends hex or quoted text typed on stdin (or read from a script). With
/// --mitm it sits between two ports, relays traffic in both directions and
/// shows it, and lets the operator inject bytes towards either side.
#[derive(Parser, Debug)]
#[command(name = "hexterm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Serial port (the DCE side in MITM mode).
    pub port: Option<String>,

    /// Baud rate.
    #[arg(short = 'b', long = "baud", default_value_t = 9600)]
    pub baud: u32,

    /// Flow control: none, hardware or software.
    #[arg(short = 'f', long = "flow", value_name = "MODE", default_value = "none")]
    pub flow: String,

    /// Text codec for decoding and quoted literals (ascii, latin1, cp1252, utf8).
    #[arg(short = 'c', long = "codec", value_name = "NAME", default_value = "latin1")]
    pub codec: String,

    /// Data bits, parity and stop bits, e.g. 8N1, 7E1, 8N1.5.
    #[arg(short = 'F', long = "framing", value_name = "DPS", default_value = "8N1")]
    pub framing: String,

    /// Read input lines from FILE instead of stdin.
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Append every message to FILE.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Relay between PORT and this peer port (the DTE side).
    #[arg(short = 'm', long = "mitm", value_name = "PORT")]
    pub mitm: Option<String>,

    /// Start the relay with forwarding disabled.
    #[arg(short = 'n', long = "no-forward", requires = "mitm")]
    pub no_forward: bool,

    /// Prefix messages with a timestamp (default).
    #[arg(short = 't', long = "timestamps", overrides_with = "no_timestamps")]
    pub timestamps: bool,

    /// Do not prefix messages with a timestamp.
    #[arg(long = "no-timestamps", overrides_with = "timestamps")]
    pub no_timestamps: bool,

    /// TOML file overriding coalescing and timing defaults.
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// List available serial ports and exit.
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Print diagnostics on stderr.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Also append diagnostics to FILE.
    #[arg(long = "diag-log", value_name = "FILE")]
    pub diag_log: Option<PathBuf>,
}

impl Cli {
    /// Validate the arguments and build the session settings.
    pub fn into_settings(self) -> HextermResult<Settings> {
        let name = self
            .port
            .ok_or_else(|| HextermError::config("no serial port given (use --list to see ports)"))?;
        if self.baud == 0 {
            return Err(HextermError::config("baud rate must be greater than zero"));
        }
        let framing: Framing = self.framing.parse()?;
        let flow_control: FlowControl = self.flow.parse()?;
        let codec: CodecSpec = self.codec.parse()?;

        let port = PortSettings {
            name,
            baud_rate: self.baud,
            framing,
            flow_control,
        };

        let peer = match self.mitm {
            Some(peer) if peer == port.name => {
                return Err(HextermError::config(format!(
                    "MITM peer {} is the same port as the primary",
                    peer
                )));
            }
            Some(peer) => Some(PortSettings {
                name: peer,
                ..port.clone()
            }),
            None => None,
        };

        let tuning = match &self.config {
            Some(path) => load_tuning(path)?,
            None => Tuning::default(),
        };

        let mut settings = Settings::with_port(port);
        settings.peer = peer;
        settings.forwarding = !self.no_forward;
        settings.codec = codec;
        settings.timestamps = !self.no_timestamps;
        settings.input = self.input;
        settings.output = self.output;
        settings.tuning = tuning;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::Parity;

    fn settings(args: &[&str]) -> HextermResult<Settings> {
        let mut argv = vec!["hexterm"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().into_settings()
    }

    #[test]
    fn test_defaults() {
        let s = settings(&["/dev/ttyUSB0"]).unwrap();
        assert_eq!(s.port.name, "/dev/ttyUSB0");
        assert_eq!(s.port.baud_rate, 9600);
        assert_eq!(s.port.framing, Framing::default());
        assert_eq!(s.port.flow_control, FlowControl::None);
        assert_eq!(s.codec, CodecSpec::Latin1);
        assert!(s.timestamps);
        assert!(!s.is_mitm());
        assert_eq!(s.tuning, Tuning::default());
    }

    #[test]
    fn test_mitm_peer_shares_line_settings() {
        let s = settings(&["COM3", "-m", "COM4", "-b", "115200", "-F", "7E1", "-n", "--no-timestamps"]).unwrap();
        let peer = s.peer.as_ref().unwrap();
        assert_eq!(peer.name, "COM4");
        assert_eq!(peer.baud_rate, 115_200);
        assert_eq!(peer.framing.parity, Parity::Even);
        assert!(!s.forwarding);
        assert!(!s.timestamps);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for args in [
            &["COM3", "-b", "0"][..],
            &["COM3", "-F", "9X3"][..],
            &["COM3", "-f", "maybe"][..],
            &["COM3", "-c", "ebcdic"][..],
            &["COM3", "-m", "COM3"][..],
            &[][..],
        ] {
            let err = settings(args).unwrap_err();
            assert_eq!(err.exit_code(), 2, "args {:?}: {}", args, err);
        }
    }

    #[test]
    fn test_no_forward_requires_mitm() {
        assert!(Cli::try_parse_from(["hexterm", "COM3", "-n"]).is_err());
    }

    #[test]
    fn test_last_timestamp_flag_wins() {
        let s = settings(&["COM3", "--no-timestamps", "-t"]).unwrap();
        assert!(s.timestamps);
    }
}
