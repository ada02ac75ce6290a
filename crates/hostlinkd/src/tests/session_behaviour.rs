//! Behavioural tests for request dispatch over live WebSocket sessions.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use crate::client::ClientError;

use super::support::SessionWorld;

type StepResult = Result<(), String>;

#[fixture]
fn world() -> RefCell<SessionWorld> {
    RefCell::new(SessionWorld::new())
}

#[given("a call timeout of {ms} milliseconds")]
fn given_call_timeout(world: &RefCell<SessionWorld>, ms: u64) {
    world.borrow_mut().set_call_timeout_ms(ms);
}

#[given("a running bridge with a connected client")]
fn given_running_bridge(world: &RefCell<SessionWorld>) {
    world.borrow_mut().start();
}

#[given("a host thread draining every {ms} milliseconds")]
fn given_ticker(world: &RefCell<SessionWorld>, ms: u64) {
    world.borrow_mut().tick_every(ms);
}

#[given("a host thread that never drains")]
fn given_stalled_host(world: &RefCell<SessionWorld>) {
    world.borrow_mut().stall_host();
}

#[given("the host module gains a new method")]
fn given_new_method(world: &RefCell<SessionWorld>) {
    world.borrow().enable_extra_method();
}

#[when("the client calls {method}")]
fn when_client_calls(world: &RefCell<SessionWorld>, method: String) {
    world.borrow_mut().call(&method);
}

#[when("the client sends a malformed message")]
fn when_client_sends_garbage(world: &RefCell<SessionWorld>) {
    world.borrow_mut().send_raw("this is not json");
}

#[when("the client sends a request without an id")]
fn when_client_sends_without_id(world: &RefCell<SessionWorld>) {
    world.borrow_mut().send_raw(r#"{"method":"echo","params":{"k":"v"}}"#);
}

#[then("the call returns a pong")]
fn then_pong(world: &RefCell<SessionWorld>) -> StepResult {
    expect_result(&world.borrow(), &json!({"pong": true}))
}

#[then("the call returns version {version}")]
fn then_version(world: &RefCell<SessionWorld>, version: String) -> StepResult {
    expect_result(&world.borrow(), &json!(version))
}

#[then("the call reports {count} methods after reloading {modules} modules")]
fn then_reload_summary(
    world: &RefCell<SessionWorld>,
    count: usize,
    modules: usize,
) -> StepResult {
    expect_result(
        &world.borrow(),
        &json!({"reloadedCount": modules, "methodCount": count}),
    )
}

#[then("the call succeeds")]
fn then_call_succeeds(world: &RefCell<SessionWorld>) -> StepResult {
    match world.borrow().last_call() {
        Ok(_) => Ok(()),
        Err(error) => Err(format!("call failed: {error}")),
    }
}

#[then("the call fails with code {code}")]
fn then_call_fails_with(world: &RefCell<SessionWorld>, code: i64) -> StepResult {
    match world.borrow().last_call() {
        Err(ClientError::Remote { code: actual, .. }) if *actual == code => Ok(()),
        other => Err(format!("expected remote error {code}, got {other:?}")),
    }
}

#[then("the error message mentions {snippet}")]
fn then_error_mentions(world: &RefCell<SessionWorld>, snippet: String) -> StepResult {
    match world.borrow().last_call() {
        Err(ClientError::Remote { message, .. }) if message.contains(&snippet) => Ok(()),
        other => Err(format!("expected message containing '{snippet}', got {other:?}")),
    }
}

#[then("the response has a null id and code {code}")]
fn then_null_id_error(world: &RefCell<SessionWorld>, code: i64) -> StepResult {
    let world = world.borrow();
    let envelope = world.last_envelope();
    if envelope.id != Value::Null {
        return Err(format!("expected null id, got {}", envelope.id));
    }
    match envelope.error() {
        Some(error) if error.code == code => Ok(()),
        other => Err(format!("expected error code {code}, got {other:?}")),
    }
}

#[then("the response has a null id and echoes the params")]
fn then_null_id_echo(world: &RefCell<SessionWorld>) -> StepResult {
    let world = world.borrow();
    let envelope = world.last_envelope();
    let expected = json!({"id": null, "result": {"k": "v"}});
    let actual = serde_json::to_value(envelope).map_err(|error| error.to_string())?;
    if actual == expected {
        Ok(())
    } else {
        Err(format!("unexpected envelope {actual}"))
    }
}

#[then("the server is still running")]
fn then_server_running(world: &RefCell<SessionWorld>) {
    assert!(world.borrow().server_running());
}

fn expect_result(world: &SessionWorld, expected: &Value) -> StepResult {
    match world.last_call() {
        Ok(value) if value == expected => Ok(()),
        other => Err(format!("expected {expected}, got {other:?}")),
    }
}

#[scenario(path = "tests/features/bridge_session.feature")]
fn bridge_session(world: RefCell<SessionWorld>) -> Result<(), String> {
    let _ = world;
    Ok(())
}
