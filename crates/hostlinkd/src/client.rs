//! Blocking WebSocket client for the bridge protocol.
//!
//! Used by the `hostlink-call` tool and by tests that drive a running
//! server end to end. Requests carry string ids drawn from a per-client
//! counter; responses for other ids are skipped while waiting.
//!
//! A call that loses the connection fails. Clients built
//! [`with_reconnect`](BridgeClient::with_reconnect) dial the endpoint again
//! before their next call.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};
use tungstenite::{HandshakeError, Message, WebSocket};

use hostlink_config::Endpoint;

use crate::dispatch::{Outcome, ResponseEnvelope};

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Errors reported by [`BridgeClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint host did not resolve.
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        /// Endpoint being resolved.
        endpoint: Endpoint,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },
    /// No resolved address accepted a TCP connection.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Endpoint being reached.
        endpoint: Endpoint,
        /// Error from the last address tried.
        #[source]
        source: io::Error,
    },
    /// The WebSocket upgrade was refused or broke off.
    #[error("websocket handshake with {endpoint} failed: {message}")]
    Handshake {
        /// Endpoint being reached.
        endpoint: Endpoint,
        /// Description of the failure.
        message: String,
    },
    /// Reading or writing a frame failed.
    #[error("websocket transport error: {source}")]
    Transport {
        /// Underlying WebSocket error.
        #[from]
        source: tungstenite::Error,
    },
    /// A response frame was not a valid envelope.
    #[error("malformed response: {source}")]
    Decode {
        /// Underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
    /// The server closed the connection while a call was outstanding.
    #[error("connection closed by server")]
    Closed,
    /// No matching response arrived in time.
    #[error("no response to '{method}' within {}ms", .timeout.as_millis())]
    Timeout {
        /// Method that was called.
        method: String,
        /// Wait bound that elapsed.
        timeout: Duration,
    },
    /// The server answered with an error object.
    #[error("remote error {code}: {message}")]
    Remote {
        /// Protocol error code.
        code: i64,
        /// Server-supplied message.
        message: String,
    },
}

impl ClientError {
    /// Whether the error means the connection is gone.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Closed | Self::Transport { .. })
    }
}

/// Synchronous connection to a bridge endpoint.
#[derive(Debug)]
pub struct BridgeClient {
    endpoint: Endpoint,
    socket: WebSocket<TcpStream>,
    next_id: u64,
    timeout: Duration,
    reconnect: bool,
    disconnected: bool,
}

impl BridgeClient {
    /// Connects and upgrades to WebSocket, trying each resolved address.
    ///
    /// `timeout` bounds the TCP connect and, later, each call.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when resolution, connection, or the upgrade
    /// fails.
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Self, ClientError> {
        let socket = open_socket(endpoint, timeout)?;
        debug!(target: CLIENT_TARGET, %endpoint, "connected");
        Ok(Self {
            endpoint: endpoint.clone(),
            socket,
            next_id: 1,
            timeout,
            reconnect: false,
            disconnected: false,
        })
    }

    /// Re-dials the endpoint before the next call whenever the connection
    /// has been lost.
    #[must_use]
    pub fn with_reconnect(mut self) -> Self {
        self.reconnect = true;
        self
    }

    /// Replaces the connection with a fresh one to the same endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the endpoint cannot be reached; the
    /// client stays disconnected.
    pub fn reconnect(&mut self) -> Result<(), ClientError> {
        self.socket = open_socket(&self.endpoint, self.timeout)?;
        self.disconnected = false;
        info!(target: CLIENT_TARGET, endpoint = %self.endpoint, "reconnected");
        Ok(())
    }

    /// Whether the last exchange left the connection usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.disconnected
    }

    /// Per-call wait bound.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Calls `method` and waits for its response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Remote`] when the server answers with an error
    /// object, [`ClientError::Timeout`] when no matching response arrives in
    /// time, and transport errors otherwise. A reconnecting client that fails
    /// to re-dial returns the connect error.
    pub fn call(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        if self.disconnected && self.reconnect {
            self.reconnect()?;
        }
        let result = self.exchange(method, params);
        match &result {
            Err(error) if error.is_disconnect() => {
                debug!(target: CLIENT_TARGET, endpoint = %self.endpoint, %error, "connection lost");
                self.disconnected = true;
            }
            _ => {}
        }
        result
    }

    fn exchange(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.to_string();
        self.next_id += 1;
        let request = json!({ "id": id, "method": method, "params": params });
        self.send_text(&request.to_string())?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(self.timed_out(method));
            };
            let envelope = match self.recv_envelope_within(remaining) {
                Ok(Some(envelope)) => envelope,
                Ok(None) => return Err(self.timed_out(method)),
                Err(error) => return Err(error),
            };
            if envelope.id.as_str() != Some(id.as_str()) {
                debug!(target: CLIENT_TARGET, id = %envelope.id, "skipping unrelated response");
                continue;
            }
            return match envelope.outcome {
                Outcome::Result(value) => Ok(value),
                Outcome::Error(error) => Err(ClientError::Remote {
                    code: error.code,
                    message: error.message,
                }),
            };
        }
    }

    /// Sends a raw text frame; useful for exercising malformed input.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the frame cannot be written.
    pub fn send_text(&mut self, text: &str) -> Result<(), ClientError> {
        self.socket.send(Message::text(text))?;
        Ok(())
    }

    /// Waits up to the call timeout for the next response envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`] when nothing arrives in time, and
    /// transport or decode errors otherwise.
    pub fn recv_envelope(&mut self) -> Result<ResponseEnvelope, ClientError> {
        match self.recv_envelope_within(self.timeout)? {
            Some(envelope) => Ok(envelope),
            None => Err(self.timed_out("<recv>")),
        }
    }

    /// Sends a close frame and waits briefly for the server to acknowledge.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the close handshake fails.
    pub fn close(mut self) -> Result<(), ClientError> {
        self.socket.close(None)?;
        loop {
            match self.socket.read() {
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Ok(());
                }
                Err(tungstenite::Error::Io(error)) if is_timeout(&error) => return Ok(()),
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn recv_envelope_within(
        &mut self,
        wait: Duration,
    ) -> Result<Option<ResponseEnvelope>, ClientError> {
        let deadline = Instant::now() + wait;
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(None);
            };
            if remaining.is_zero() {
                return Ok(None);
            }
            self.socket
                .get_ref()
                .set_read_timeout(Some(remaining))
                .map_err(tungstenite::Error::Io)?;
            match self.socket.read() {
                Ok(Message::Text(text)) => {
                    return Ok(Some(serde_json::from_str(text.as_str())?));
                }
                Ok(Message::Binary(bytes)) => return Ok(Some(serde_json::from_slice(&bytes)?)),
                Ok(Message::Close(_)) => return Err(ClientError::Closed),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(tungstenite::Error::Io(error)) if is_timeout(&error) => return Ok(None),
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Err(ClientError::Closed);
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn timed_out(&self, method: &str) -> ClientError {
        ClientError::Timeout {
            method: method.to_owned(),
            timeout: self.timeout,
        }
    }
}

fn open_socket(
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<WebSocket<TcpStream>, ClientError> {
    let addrs: Vec<SocketAddr> = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|source| ClientError::Resolve {
            endpoint: endpoint.clone(),
            source,
        })?
        .collect();
    let stream = connect_any(&addrs, timeout).map_err(|source| ClientError::Connect {
        endpoint: endpoint.clone(),
        source,
    })?;
    stream.set_nodelay(true).ok();
    stream
        .set_read_timeout(Some(timeout))
        .map_err(|source| ClientError::Connect {
            endpoint: endpoint.clone(),
            source,
        })?;

    let url = format!("{}/", endpoint.ws_url());
    let (socket, _response) = match tungstenite::client(url.as_str(), stream) {
        Ok(pair) => pair,
        Err(HandshakeError::Failure(error)) => {
            return Err(ClientError::Handshake {
                endpoint: endpoint.clone(),
                message: error.to_string(),
            });
        }
        Err(HandshakeError::Interrupted(_)) => {
            return Err(ClientError::Handshake {
                endpoint: endpoint.clone(),
                message: String::from("handshake timed out"),
            });
        }
    };
    Ok(socket)
}

fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> Result<TcpStream, io::Error> {
    let mut last_error = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(error) => last_error = error,
        }
    }
    Err(last_error)
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
