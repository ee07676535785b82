#[macro_use]
mod logging;

pub mod cli;
pub mod io;
pub mod session;
pub mod settings;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::cli::Cli;
use crate::io::serial::list_serial_ports;
use crate::io::HextermError;

/// Grace period for blocking threads (stdin, read loops) at exit
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

fn print_ports() -> ExitCode {
    match list_serial_ports() {
        Ok(ports) if ports.is_empty() => {
            println!("No serial ports found");
            ExitCode::SUCCESS
        }
        Ok(ports) => {
            for p in ports {
                let mut line = format!("{}  [{}]", p.port_name, p.port_type);
                if let (Some(vid), Some(pid)) = (p.vid, p.pid) {
                    line.push_str(&format!("  {:04x}:{:04x}", vid, pid));
                }
                if let Some(product) = p.product.or(p.manufacturer) {
                    line.push_str(&format!("  {}", product));
                }
                println!("{}", line);
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn fail(e: HextermError) -> ExitCode {
    eprintln!("hexterm: {}", e);
    ExitCode::from(e.exit_code())
}

/// Parse the command line, run one session and map the outcome to an exit code.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    logging::set_verbose(cli.verbose);
    if let Some(path) = &cli.diag_log {
        if let Err(e) = logging::init_file_logging(path) {
            eprintln!("hexterm: {}", e);
        }
    }

    if cli.list {
        return print_ports();
    }

    let settings = match cli.into_settings() {
        Ok(s) => Arc::new(s),
        Err(e) => return fail(e),
    };
    tlog!("[main] Starting with {:?}", settings);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("hexterm: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(session::run_session(settings));
    // A blocking stdin read never returns on its own; don't wait for it
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    logging::stop_file_logging();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}
