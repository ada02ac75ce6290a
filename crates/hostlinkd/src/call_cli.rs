//! One-shot command-line client: `hostlink-call <method> [params-json]`.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;

use hostlink_config::{DEFAULT_HOST, DEFAULT_PORT, Endpoint};

use crate::client::{BridgeClient, ClientError};

/// Calls one method on a running bridge and prints the result as JSON.
#[derive(Parser, Debug)]
#[command(name = "hostlink-call")]
pub(crate) struct CallCli {
    /// Bridge endpoint, as `ws://host:port` or `host:port`.
    #[arg(long, default_value_t = Endpoint::new(DEFAULT_HOST, DEFAULT_PORT))]
    endpoint: Endpoint,
    /// How long to wait for the connection and the response.
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
    /// Method to call.
    method: String,
    /// Parameters as a JSON value; defaults to `{}`.
    params: Option<String>,
}

/// Parses `args`, performs the call, and writes the outcome.
///
/// The result goes to `stdout` as a single JSON line. Remote errors print
/// `error <code>: <message>` to `stderr` and exit with status 1; local
/// failures (bad arguments, connection problems) exit with status 2.
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    ExitCode::from(execute(args, stdout, stderr))
}

fn execute<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> u8
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match CallCli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            write!(stderr, "{error}").ok();
            return if error.use_stderr() { 2 } else { 0 };
        }
    };
    let params = match cli.params.as_deref().map(serde_json::from_str::<Value>) {
        None => Value::Object(serde_json::Map::new()),
        Some(Ok(value)) => value,
        Some(Err(error)) => {
            writeln!(stderr, "invalid params JSON: {error}").ok();
            return 2;
        }
    };

    match call(&cli, params) {
        Ok(result) => {
            writeln!(stdout, "{result}").ok();
            0
        }
        Err(ClientError::Remote { code, message }) => {
            writeln!(stderr, "error {code}: {message}").ok();
            1
        }
        Err(error) => {
            writeln!(stderr, "{error}").ok();
            2
        }
    }
}

fn call(cli: &CallCli, params: Value) -> Result<Value, ClientError> {
    let timeout = Duration::from_millis(cli.timeout_ms);
    let mut client = BridgeClient::connect(&cli.endpoint, timeout)?;
    let result = client.call(&cli.method, params)?;
    // The answer is already in hand; a failed close handshake changes nothing.
    client.close().ok();
    Ok(result)
}
