//! Test suites exercising the server end to end over loopback TCP.

mod shutdown_behaviour;
mod support;
