//! Standalone bridge daemon: serves the configured endpoint until signalled.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match hostlinkd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            writeln!(io::stderr().lock(), "hostlinkd: {error}").ok();
            ExitCode::FAILURE
        }
    }
}
