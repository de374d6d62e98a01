//! Behavioural tests for draining and stopping a running server.

use std::cell::RefCell;
use std::net::TcpStream;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::json;

use crate::server::ShutdownReport;
use crate::shutdown::LifecycleState;
use crate::tests::support::{
    LifecycleEvent, RpcClient, TestServer, error_code, loopback_config, wait_until,
};

#[derive(Default)]
struct ShutdownWorld {
    server: Option<TestServer>,
    client: Option<RpcClient>,
    report: Option<ShutdownReport>,
}

impl ShutdownWorld {
    fn server(&self) -> &TestServer {
        self.server.as_ref().expect("server should be running")
    }

    fn client(&mut self) -> &mut RpcClient {
        self.client.as_mut().expect("client should be connected")
    }

    fn report(&self) -> &ShutdownReport {
        self.report.as_ref().expect("server should have stopped")
    }
}

#[fixture]
fn world() -> RefCell<ShutdownWorld> {
    RefCell::new(ShutdownWorld::default())
}

#[given("a running server that admits one request at a time")]
fn given_single_slot_server(world: &RefCell<ShutdownWorld>) {
    let server = TestServer::start(&loopback_config(1));
    let client = server.client();
    let mut world = world.borrow_mut();
    world.server = Some(server);
    world.client = Some(client);
}

#[given("the client holds request {id} at the gate")]
fn given_blocking_request(world: &RefCell<ShutdownWorld>, id: u64) {
    let mut world = world.borrow_mut();
    world.client().call(id, "Test.block", json!("released"));
    assert!(world.server().gate.wait_for_running(1));
}

#[given("request {id} is waiting for admission")]
fn given_waiting_request(world: &RefCell<ShutdownWorld>, id: u64) {
    let mut world = world.borrow_mut();
    let before = world.server().handle().stats().received;
    world
        .client()
        .call(id, "StringOperations.CountString", json!(["queued"]));
    let server = world.server();
    assert!(
        wait_until(|| server.handle().stats().received == before + 1),
        "request {id} should reach the dispatcher"
    );
    assert_eq!(server.handle().in_flight(), 1);
}

#[when("shutdown is triggered")]
fn when_shutdown_triggered(world: &RefCell<ShutdownWorld>) {
    assert!(world.borrow().server().handle().trigger());
    assert!(
        !world.borrow().server().handle().trigger(),
        "a second trigger should be a no-op"
    );
}

#[when("the client sends request {id} on the open connection")]
fn when_send_on_open_connection(world: &RefCell<ShutdownWorld>, id: u64) {
    world
        .borrow_mut()
        .client()
        .call(id, "StringOperations.CountString", json!(["late"]));
}

#[when("the gate is opened")]
fn when_release_blocking(world: &RefCell<ShutdownWorld>) {
    world.borrow().server().gate.open();
}

#[when("the server stops")]
fn when_server_stops(world: &RefCell<ShutdownWorld>) {
    let mut world = world.borrow_mut();
    let report = world
        .server
        .as_mut()
        .expect("server should be running")
        .shutdown();
    world.report = Some(report);
}

#[then("new connections are refused")]
fn then_connections_refused(world: &RefCell<ShutdownWorld>) {
    let addr = world.borrow().server().addr();
    assert!(
        wait_until(|| TcpStream::connect(addr).is_err()),
        "listener should be closed after shutdown is triggered"
    );
}

#[then("the server is draining")]
fn then_server_draining(world: &RefCell<ShutdownWorld>) {
    assert_eq!(
        world.borrow().server().handle().state(),
        LifecycleState::Draining
    );
}

#[then("request {id} fails with error code {code}")]
fn then_request_fails(world: &RefCell<ShutdownWorld>, id: u64, code: i64) {
    let reply = world.borrow_mut().client().read_response(id);
    assert_eq!(error_code(&reply), Some(code), "reply: {reply}");
}

#[then("held request {id} returns its parameters")]
fn then_request_completes(world: &RefCell<ShutdownWorld>, id: u64) {
    let reply = world.borrow_mut().client().read_response(id);
    assert_eq!(reply["result"], json!("released"), "reply: {reply}");
}

#[then("{received} requests were received and {completed} completed")]
fn then_counts(world: &RefCell<ShutdownWorld>, received: u64, completed: u64) {
    let world = world.borrow();
    let stats = world.report().stats;
    assert_eq!(stats.received, received);
    assert_eq!(stats.completed, completed);
}

#[then("{cancelled} requests were cancelled")]
fn then_cancelled(world: &RefCell<ShutdownWorld>, cancelled: u64) {
    assert_eq!(world.borrow().report().stats.cancelled, cancelled);
}

#[then("the lifecycle ran from listening through draining to stopped")]
fn then_lifecycle(world: &RefCell<ShutdownWorld>) {
    let world = world.borrow();
    let server = world.server.as_ref().expect("server fixture");
    let events = server.reporter.events();
    let [
        LifecycleEvent::Listening(addr),
        LifecycleEvent::Draining,
        LifecycleEvent::Stopped(stats),
    ] = events.as_slice()
    else {
        panic!("unexpected lifecycle events: {events:?}");
    };
    assert_eq!(*addr, server.addr());
    assert_eq!(*stats, world.report().stats);
}

#[scenario(
    path = "tests/features/shutdown.feature",
    name = "Draining finishes admitted work and refuses the rest"
)]
fn draining_finishes_admitted_work(#[from(world)] world: RefCell<ShutdownWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/shutdown.feature",
    name = "Shutdown of an idle server"
)]
fn idle_shutdown(#[from(world)] world: RefCell<ShutdownWorld>) {
    drop(world);
}
