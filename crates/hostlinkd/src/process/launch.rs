//! Supervises bridge launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::info;

use crate::StructuredHealthReporter;
use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::HealthReporter;
use crate::registry::HandlerModule;
use crate::ticker::HostTicker;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to run the bridge process.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown: S,
    pub(crate) modules: Vec<Box<dyn HandlerModule>>,
}

/// Runs the bridge using the production collaborators until a termination
/// signal arrives.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, the listener, the ticker, or the
/// signal handlers fail.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal::new(),
        modules: Vec::new(),
    })
}

/// Runs the bridge with injected collaborators.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
        modules,
    } = plan;

    let bridge = bootstrap_with(&loader, reporter, modules)?;
    info!(
        target: PROCESS_TARGET,
        endpoint = %bridge.config().endpoint(),
        "starting bridge runtime"
    );
    let server = bridge.server();
    server.start()?;
    let ticker = match bridge.config().tick_interval() {
        Some(interval) => Some(
            HostTicker::spawn(Arc::clone(bridge.dispatcher()), interval)
                .map_err(|source| LaunchError::Ticker { source })?,
        ),
        None => None,
    };

    shutdown.wait()?;

    if let Some(mut ticker) = ticker {
        ticker.stop();
    }
    server.stop();
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::Duration;

    use hostlink_config::{Config, Endpoint};
    use serde_json::json;

    use super::*;
    use crate::bootstrap::{BootstrapError, StaticConfigLoader};
    use crate::client::{BridgeClient, ClientError};
    use crate::process::shutdown::ShutdownError;

    /// Reports the listening address so the test can connect.
    struct AddrReporter {
        listening: Mutex<Sender<SocketAddr>>,
    }

    impl HealthReporter for AddrReporter {
        fn bootstrap_starting(&self) {}
        fn bootstrap_succeeded(&self, _config: &Config) {}
        fn bootstrap_failed(&self, _error: &BootstrapError) {}
        fn server_listening(&self, addr: SocketAddr) {
            if let Ok(sender) = self.listening.lock() {
                sender.send(addr).ok();
            }
        }
        fn server_stopped(&self, _addr: SocketAddr) {}
    }

    /// Shutdown signal released by the test.
    struct ChannelShutdown {
        release: Mutex<Receiver<()>>,
    }

    impl ShutdownSignal for ChannelShutdown {
        fn wait(&self) -> Result<(), ShutdownError> {
            if let Ok(receiver) = self.release.lock() {
                receiver.recv().ok();
            }
            Ok(())
        }
    }

    fn config(tick_interval_ms: Option<u64>) -> Config {
        Config {
            host: String::from("127.0.0.1"),
            port: 0,
            tick_interval_ms,
            ..Config::default()
        }
    }

    fn launch(config: Config) -> (SocketAddr, Sender<()>, std::thread::JoinHandle<()>) {
        let (addr_tx, addr_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let plan = LaunchPlan {
            loader: StaticConfigLoader::new(config),
            reporter: Arc::new(AddrReporter {
                listening: Mutex::new(addr_tx),
            }),
            shutdown: ChannelShutdown {
                release: Mutex::new(release_rx),
            },
            modules: Vec::new(),
        };
        let runner = std::thread::spawn(move || {
            run_daemon_with(plan).expect("daemon run");
        });
        let addr = addr_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("server listening");
        (addr, release_tx, runner)
    }

    fn endpoint(addr: SocketAddr) -> Endpoint {
        Endpoint::new(addr.ip().to_string(), addr.port())
    }

    #[test]
    fn ticking_daemon_serves_host_methods_until_signalled() {
        let (addr, release, runner) = launch(config(Some(5)));

        let mut client =
            BridgeClient::connect(&endpoint(addr), Duration::from_secs(5)).expect("connect");
        let result = client.call("ping", json!({})).expect("ping");
        assert_eq!(result, json!({"pong": true}));
        client.close().expect("close");

        release.send(()).expect("release");
        runner.join().expect("daemon thread");
        assert!(BridgeClient::connect(&endpoint(addr), Duration::from_millis(500)).is_err());
    }

    #[test]
    fn daemon_without_ticker_runs_host_methods_inline() {
        let (addr, release, runner) = launch(config(None));

        let mut client =
            BridgeClient::connect(&endpoint(addr), Duration::from_secs(5)).expect("connect");
        assert_eq!(
            client.call("echo", json!({"a": 1})).expect("echo"),
            json!({"a": 1})
        );
        assert_eq!(
            client.call("ping", json!({})).expect("ping"),
            json!({"pong": true})
        );
        let error = client
            .call("doesNotExist", json!({}))
            .expect_err("unknown method");
        assert!(matches!(error, ClientError::Remote { code: -32601, .. }));

        release.send(()).expect("release");
        runner.join().expect("daemon thread");
    }

    #[test]
    fn invalid_configuration_fails_before_listening() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (addr_tx, _addr_rx) = mpsc::channel();
        let plan = LaunchPlan {
            loader: StaticConfigLoader::new(Config {
                call_timeout_ms: 0,
                ..config(None)
            }),
            reporter: Arc::new(AddrReporter {
                listening: Mutex::new(addr_tx),
            }),
            shutdown: ChannelShutdown {
                release: Mutex::new(release_rx),
            },
            modules: Vec::new(),
        };
        drop(release_tx);
        let error = run_daemon_with(plan).expect_err("validation must fail");
        assert!(matches!(
            error,
            LaunchError::Bootstrap {
                source: BootstrapError::Validation { .. }
            }
        ));
    }
}
