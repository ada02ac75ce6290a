//! WebSocket connection sessions.
//!
//! A session owns one upgraded connection. Each inbound text or binary frame
//! is dispatched on its own thread, so a session can have any number of
//! requests in flight and answers them in completion order. Finished
//! responses travel back over a channel and are written by the session
//! thread, which is the only thread touching the socket.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use tungstenite::{HandshakeError, Message, WebSocket};

use super::{LISTENER_TARGET, SessionError};
use crate::dispatch::{Dispatcher, ResponseEnvelope};

/// Upper bound on the opening handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// How often an idle session wakes to flush responses and check shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Sent if a response envelope cannot be encoded, which should not happen
/// for values produced by `serde_json`.
const ENCODE_FAILURE: &str =
    r#"{"id":null,"error":{"code":-32000,"message":"failed to encode response"}}"#;

/// One client connection and its in-flight requests.
pub(crate) struct ConnectionSession {
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    closing: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
}

impl ConnectionSession {
    pub(crate) fn new(
        peer: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        closing: Arc<AtomicBool>,
    ) -> Self {
        Self {
            peer,
            dispatcher,
            closing,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Upgrades `stream` and serves it until the peer leaves or the server
    /// begins closing.
    pub(crate) fn run(self, stream: TcpStream) -> Result<(), SessionError> {
        stream
            .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
            .map_err(|source| SessionError::Socket { source })?;
        let mut socket = match tungstenite::accept(stream) {
            Ok(socket) => socket,
            Err(HandshakeError::Failure(source)) => {
                return Err(SessionError::Handshake { source });
            }
            Err(HandshakeError::Interrupted(_)) => return Err(SessionError::HandshakeTimeout),
        };
        socket
            .get_ref()
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(|source| SessionError::Socket { source })?;
        debug!(target: LISTENER_TARGET, peer = %self.peer, "session opened");

        let (responses_tx, responses_rx) = mpsc::channel();
        let result = self.serve(&mut socket, &responses_tx, &responses_rx);
        debug!(
            target: LISTENER_TARGET,
            peer = %self.peer,
            in_flight = self.in_flight.load(Ordering::SeqCst),
            "session closed"
        );
        result
    }

    fn serve(
        &self,
        socket: &mut WebSocket<TcpStream>,
        responses_tx: &Sender<String>,
        responses_rx: &Receiver<String>,
    ) -> Result<(), SessionError> {
        loop {
            if self.closing.load(Ordering::SeqCst) {
                // Best effort: the peer may already be gone.
                socket.close(None).ok();
                socket.flush().ok();
                return Ok(());
            }

            while let Ok(response) = responses_rx.try_recv() {
                match socket.send(Message::text(response)) {
                    Ok(()) => {}
                    Err(error) => return close_result(error),
                }
            }

            match socket.read() {
                Ok(Message::Text(text)) => {
                    self.spawn_request(text.as_bytes().to_vec(), responses_tx);
                }
                Ok(Message::Binary(bytes)) => self.spawn_request(bytes.to_vec(), responses_tx),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                    if let Err(error) = socket.flush() {
                        return close_result(error);
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!(target: LISTENER_TARGET, peer = %self.peer, "peer requested close");
                }
                Err(tungstenite::Error::Io(error)) if is_poll_timeout(&error) => {}
                Err(error) => return close_result(error),
            }
        }
    }

    fn spawn_request(&self, payload: Vec<u8>, responses_tx: &Sender<String>) {
        let payload: Arc<[u8]> = Arc::from(payload);
        let task = RequestTask {
            dispatcher: Arc::clone(&self.dispatcher),
            payload: Arc::clone(&payload),
            responses: responses_tx.clone(),
            in_flight: Arc::clone(&self.in_flight),
        };
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(String::from("hostlink-request"))
            .spawn(move || task.run());
        if let Err(error) = spawned {
            warn!(
                target: LISTENER_TARGET,
                peer = %self.peer,
                error = %error,
                "failed to spawn request thread; handling inline"
            );
            RequestTask {
                dispatcher: Arc::clone(&self.dispatcher),
                payload,
                responses: responses_tx.clone(),
                in_flight: Arc::clone(&self.in_flight),
            }
            .run();
        }
    }
}

/// One request being dispatched off the session thread.
struct RequestTask {
    dispatcher: Arc<Dispatcher>,
    payload: Arc<[u8]>,
    responses: Sender<String>,
    in_flight: Arc<AtomicUsize>,
}

impl RequestTask {
    fn run(self) {
        let envelope = self.dispatcher.handle_message(&self.payload);
        // The session may have ended while the handler ran.
        self.responses.send(encode(&envelope)).ok();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn encode(envelope: &ResponseEnvelope) -> String {
    match envelope.to_json() {
        Ok(text) => text,
        Err(error) => {
            warn!(target: LISTENER_TARGET, error = %error, "failed to encode response");
            String::from(ENCODE_FAILURE)
        }
    }
}

fn is_poll_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn close_result(error: tungstenite::Error) -> Result<(), SessionError> {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => Ok(()),
        tungstenite::Error::Io(ref io_error)
            if matches!(
                io_error.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) =>
        {
            Ok(())
        }
        source => Err(SessionError::Transport { source }),
    }
}
