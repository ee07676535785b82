use std::process::ExitCode;

fn main() -> ExitCode {
    hexterm_lib::run()
}
