//! In-process signalling servers for integration tests.
//!
//! [`TestServer`] is a hand-rolled RFC 6455 server whose misbehaviour can be
//! chosen per test; [`spawn_axum_echo`] is an independent implementation
//! built on axum.

mod axum_echo;
mod server;

#[allow(unused_imports)]
pub use axum_echo::spawn_axum_echo;
#[allow(unused_imports)]
pub use server::{Behavior, ServerEvent, TestServer};

use std::time::Duration;

use sigprobe::Config;

/// Short timers so the suites finish quickly.
#[allow(dead_code)]
pub fn fast_config() -> Config {
    Config::default()
        .with_handshake_timeout(Duration::from_millis(300))
        .with_linger(Duration::from_millis(100))
        .with_close_timeout(Duration::from_millis(300))
}
