//! Behavioural suites for the bridge bootstrap and its WebSocket sessions.

mod behaviour;
mod session_behaviour;
mod support;
