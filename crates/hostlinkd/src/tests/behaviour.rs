//! Behavioural tests for the bridge bootstrap sequence and server lifecycle.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{BootstrapWorld, FailingConfigLoader, HealthEvent, TestConfigLoader};

type StepResult = Result<(), String>;

#[fixture]
fn world() -> RefCell<BootstrapWorld> {
    RefCell::new(BootstrapWorld::new())
}

#[given("a healthy configuration loader")]
fn given_healthy_loader(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().use_loader(TestConfigLoader::new());
}

#[given("a failing configuration loader")]
fn given_failing_loader(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().use_loader(FailingConfigLoader);
}

#[given("a configuration with a call timeout of {ms} milliseconds")]
fn given_call_timeout(world: &RefCell<BootstrapWorld>, ms: u64) {
    world
        .borrow_mut()
        .use_loader(TestConfigLoader::new().with_call_timeout_ms(ms));
}

#[when("the bridge bootstrap runs")]
fn when_bootstrap_runs(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().bootstrap();
}

#[when("the server is started")]
fn when_server_started(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().start_server();
}

#[when("the server is stopped")]
fn when_server_stopped(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().stop_server();
}

#[then("bootstrap succeeds")]
fn then_bootstrap_succeeds(world: &RefCell<BootstrapWorld>) {
    let world = world.borrow();
    assert!(
        world.bootstrap_error().is_none(),
        "bootstrap error: {:?}",
        world.bootstrap_error()
    );
    assert!(world.bridge().is_some(), "bridge should have been built");
}

#[then("bootstrap fails")]
fn then_bootstrap_fails(world: &RefCell<BootstrapWorld>) {
    assert!(
        world.borrow().bootstrap_error().is_some(),
        "bootstrap succeeded unexpectedly"
    );
}

#[then("the core methods are registered")]
fn then_core_methods(world: &RefCell<BootstrapWorld>) {
    let world = world.borrow();
    let bridge = world.bridge().expect("bridge built");
    let methods = bridge
        .dispatcher()
        .registry()
        .method_names()
        .expect("method names");
    assert_eq!(methods, ["echo", "ping", "reload_handlers"]);
}

#[then("the reporter recorded bootstrap start")]
fn then_reporter_start(world: &RefCell<BootstrapWorld>) {
    assert!(
        world
            .borrow()
            .reporter
            .events()
            .contains(&HealthEvent::BootstrapStarting),
        "bootstrap start event missing"
    );
}

#[then("the reporter recorded bootstrap success")]
fn then_reporter_success(world: &RefCell<BootstrapWorld>) {
    assert!(
        world
            .borrow()
            .reporter
            .events()
            .contains(&HealthEvent::BootstrapSucceeded),
        "bootstrap success event missing"
    );
}

#[then("the reporter recorded bootstrap failure")]
fn then_reporter_failure(world: &RefCell<BootstrapWorld>) {
    let events = world.borrow().reporter.events();
    let failed = events
        .iter()
        .any(|event| matches!(event, HealthEvent::BootstrapFailed(_)));
    assert!(failed, "bootstrap failure event missing: {events:?}");
}

#[then("the reporter recorded bootstrap failure mentioning {snippet}")]
fn then_reporter_failure_mentions(world: &RefCell<BootstrapWorld>, snippet: String) -> StepResult {
    let events = world.borrow().reporter.events();
    let found = events.iter().any(|event| match event {
        HealthEvent::BootstrapFailed(message) => message.contains(&snippet),
        _ => false,
    });
    if found {
        Ok(())
    } else {
        Err(format!("no failure mentioning '{snippet}': {events:?}"))
    }
}

#[then("both starts report the same address")]
fn then_same_address(world: &RefCell<BootstrapWorld>) -> StepResult {
    let world = world.borrow();
    match world.started() {
        [first, second] if first == second && first.port() != 0 => Ok(()),
        other => Err(format!("expected two identical addresses, got {other:?}")),
    }
}

#[then("the first stop succeeds and the second is ignored")]
fn then_stop_idempotent(world: &RefCell<BootstrapWorld>) {
    let world = world.borrow();
    assert_eq!(world.stops(), [true, false]);
    assert!(!world.server_running());
}

#[then("the reporter recorded one listening and one stopped event")]
fn then_server_events(world: &RefCell<BootstrapWorld>) {
    let events = world.borrow().reporter.events();
    let listening = events
        .iter()
        .filter(|event| matches!(event, HealthEvent::ServerListening(_)))
        .count();
    let stopped = events
        .iter()
        .filter(|event| matches!(event, HealthEvent::ServerStopped(_)))
        .count();
    assert_eq!((listening, stopped), (1, 1), "events: {events:?}");
}

#[scenario(path = "tests/features/bridge_bootstrap.feature")]
fn bridge_bootstrap(world: RefCell<BootstrapWorld>) -> Result<(), String> {
    let _ = world;
    Ok(())
}
