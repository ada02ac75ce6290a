//! Calls one method on a running bridge; see [`hostlinkd::run_call`].

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    hostlinkd::run_call(std::env::args_os(), &mut stdout, &mut stderr)
}
