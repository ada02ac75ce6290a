//! Scenario worlds shared across BDD steps.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hostlink_config::Endpoint;
use serde_json::Value;

use crate::bootstrap::{Bridge, BootstrapError, ConfigLoader, bootstrap_with};
use crate::client::{BridgeClient, ClientError};
use crate::dispatch::{Dispatcher, ResponseEnvelope};
use crate::registry::HandlerModule;
use crate::server::BridgeServer;
use crate::ticker::HostTicker;

use super::{RecordingHealthReporter, SwitchableModule, TestConfigLoader};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// World for the bootstrap and server lifecycle scenarios.
pub struct BootstrapWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    bridge: Option<Bridge>,
    bootstrap_error: Option<BootstrapError>,
    server: Option<BridgeServer>,
    started: Vec<SocketAddr>,
    stops: Vec<bool>,
}

impl BootstrapWorld {
    /// Builds a world with a successful configuration loader.
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            bridge: None,
            bootstrap_error: None,
            server: None,
            started: Vec::new(),
            stops: Vec::new(),
        }
    }

    /// Installs `loader` for the next bootstrap.
    pub fn use_loader(&mut self, loader: impl ConfigLoader + 'static) {
        self.loader = Box::new(loader);
        self.bridge = None;
        self.bootstrap_error = None;
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.bridge.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        let reporter = self.reporter.clone();
        match bootstrap_with(&*self.loader, reporter, Vec::new()) {
            Ok(bridge) => self.bridge = Some(bridge),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Returns the bootstrap error, if any.
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// Returns the bootstrapped bridge, if any.
    pub fn bridge(&self) -> Option<&Bridge> {
        self.bridge.as_ref()
    }

    /// Starts the bridge's server, creating it on first use.
    pub fn start_server(&mut self) {
        let bridge = self.bridge.as_ref().expect("bridge bootstrapped");
        let server = self.server.get_or_insert_with(|| bridge.server());
        let addr = server.start().expect("server start");
        self.started.push(addr);
    }

    /// Stops the server and records whether it was running.
    pub fn stop_server(&mut self) {
        let server = self.server.as_ref().expect("server created");
        self.stops.push(server.stop());
    }

    /// Addresses returned by each start call.
    pub fn started(&self) -> &[SocketAddr] {
        &self.started
    }

    /// Results of each stop call.
    pub fn stops(&self) -> &[bool] {
        &self.stops
    }

    /// Whether the server reports itself running.
    pub fn server_running(&self) -> bool {
        self.server.as_ref().is_some_and(BridgeServer::is_running)
    }
}

impl Default for BootstrapWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a thread attached as the affinity thread without ever draining.
struct StalledHost {
    release: Sender<()>,
    handle: JoinHandle<()>,
}

impl StalledHost {
    fn spawn(dispatcher: Arc<Dispatcher>) -> Self {
        let (release, wait) = mpsc::channel::<()>();
        let (attached_tx, attached_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            dispatcher.attach_affinity_thread();
            attached_tx.send(()).expect("signal attach");
            wait.recv().ok();
            dispatcher.detach_affinity_thread();
        });
        attached_rx.recv().expect("stalled host attached");
        Self { release, handle }
    }

    fn release(self) {
        self.release.send(()).ok();
        self.handle.join().expect("stalled host thread");
    }
}

/// World for scenarios that drive a live server over WebSocket.
pub struct SessionWorld {
    module: SwitchableModule,
    call_timeout_ms: u64,
    reporter: Arc<RecordingHealthReporter>,
    bridge: Option<Bridge>,
    server: Option<BridgeServer>,
    client: Option<BridgeClient>,
    ticker: Option<HostTicker>,
    stalled: Option<StalledHost>,
    last_call: Option<Result<Value, ClientError>>,
    last_envelope: Option<ResponseEnvelope>,
}

impl SessionWorld {
    pub fn new() -> Self {
        Self {
            module: SwitchableModule::default(),
            call_timeout_ms: 30_000,
            reporter: Arc::new(RecordingHealthReporter::default()),
            bridge: None,
            server: None,
            client: None,
            ticker: None,
            stalled: None,
            last_call: None,
            last_envelope: None,
        }
    }

    /// Sets the affinity wait bound used when the bridge starts.
    pub fn set_call_timeout_ms(&mut self, call_timeout_ms: u64) {
        self.call_timeout_ms = call_timeout_ms;
    }

    /// Bootstraps the bridge, starts the server, and connects a client.
    pub fn start(&mut self) {
        let loader = TestConfigLoader::new().with_call_timeout_ms(self.call_timeout_ms);
        let modules: Vec<Box<dyn HandlerModule>> = vec![Box::new(self.module.clone())];
        let bridge =
            bootstrap_with(&loader, self.reporter.clone(), modules).expect("bootstrap bridge");
        let server = bridge.server();
        let addr = server.start().expect("server start");
        let endpoint = Endpoint::new(addr.ip().to_string(), addr.port());
        let client = BridgeClient::connect(&endpoint, CLIENT_TIMEOUT).expect("client connect");
        self.bridge = Some(bridge);
        self.server = Some(server);
        self.client = Some(client);
    }

    fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(self.bridge.as_ref().expect("bridge started").dispatcher())
    }

    /// Runs a ticker that drains every `interval_ms`.
    pub fn tick_every(&mut self, interval_ms: u64) {
        let ticker = HostTicker::spawn(self.dispatcher(), Duration::from_millis(interval_ms))
            .expect("spawn ticker");
        self.ticker = Some(ticker);
    }

    /// Attaches an affinity thread that never drains.
    pub fn stall_host(&mut self) {
        self.stalled = Some(StalledHost::spawn(self.dispatcher()));
    }

    /// Makes the test module expose `host.extra` on its next load.
    pub fn enable_extra_method(&self) {
        self.module.enable_extra();
    }

    fn client(&mut self) -> &mut BridgeClient {
        self.client.as_mut().expect("client connected")
    }

    /// Calls `method` with empty params and records the outcome.
    pub fn call(&mut self, method: &str) {
        let outcome = self
            .client()
            .call(method, Value::Object(serde_json::Map::new()));
        self.last_call = Some(outcome);
    }

    /// Sends raw text and records the envelope that comes back.
    pub fn send_raw(&mut self, text: &str) {
        let client = self.client();
        client.send_text(text).expect("send raw text");
        let envelope = client.recv_envelope().expect("receive envelope");
        self.last_envelope = Some(envelope);
    }

    /// Outcome of the last call.
    pub fn last_call(&self) -> &Result<Value, ClientError> {
        self.last_call.as_ref().expect("a call was made")
    }

    /// Envelope answering the last raw message.
    pub fn last_envelope(&self) -> &ResponseEnvelope {
        self.last_envelope.as_ref().expect("a raw message was sent")
    }

    /// Whether the server still reports itself running.
    pub fn server_running(&self) -> bool {
        self.server.as_ref().is_some_and(BridgeServer::is_running)
    }
}

impl Default for SessionWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionWorld {
    fn drop(&mut self) {
        if let Some(stalled) = self.stalled.take() {
            stalled.release();
        }
        self.ticker.take();
        if let Some(client) = self.client.take() {
            client.close().ok();
        }
        if let Some(server) = self.server.take() {
            server.stop();
        }
    }
}
