//! Shared test helpers for bridge integration tests.
//!
//! Note: We use `helpers/mod.rs` instead of `helpers.rs` because Cargo
//! auto-discovers top-level `.rs` files in `tests/` as integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use koebashi::bridge::{Bridge, EventLoop};
use koebashi::config::BridgeSettings;
use koebashi::payload::Base64Encoder;
use koebashi::{LoopbackBackend, LoopbackScript};

/// Bridge settings tuned for tests: short deadlines, no cooldown padding.
pub fn fast_settings() -> BridgeSettings {
    BridgeSettings {
        response_timeout_secs: 2,
        submit_timeout_secs: 2,
        cooldown_padding_ms: 0,
        connect_timeout_secs: 5,
    }
}

/// Launch a bridge over a loopback backend following `script`.
pub fn launch_loopback(script: LoopbackScript) -> (Bridge, EventLoop) {
    launch_loopback_with(script, &fast_settings())
}

pub fn launch_loopback_with(script: LoopbackScript, settings: &BridgeSettings) -> (Bridge, EventLoop) {
    Bridge::launch(
        move || LoopbackBackend::connect(script),
        Arc::new(Base64Encoder),
        settings,
    )
    .expect("loopback backend should start")
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
