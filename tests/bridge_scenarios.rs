//! End-to-end bridge scenarios against the loopback backend.

mod helpers;

use std::io;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use helpers::{fast_settings, launch_loopback, launch_loopback_with, wait_until};
use koebashi::backend::InboundEvents;
use koebashi::bridge::Bridge;
use koebashi::error::{BridgeError, ProcessingError, StartError, SubmitError};
use koebashi::payload::Base64Encoder;
use koebashi::{LoopbackBackend, LoopbackScript, SendOutcome};

#[test]
fn round_trip_returns_encoded_payload() {
    let (bridge, _event_loop) = launch_loopback(LoopbackScript::new().reply_delay(Duration::from_millis(20)));

    let payload = bridge.request("five books").unwrap();

    assert_eq!(payload, "Zml2ZSBib29rcw==");
    assert_eq!(bridge.pending_count(), 0, "entry removed after completion");
}

#[test]
fn silent_backend_times_out_and_cleans_up() {
    let (bridge, _event_loop) = launch_loopback(LoopbackScript::new().silent());

    let started = Instant::now();
    let err = bridge
        .request_with_deadline("hello", Duration::from_millis(100))
        .unwrap_err();

    assert!(matches!(err, BridgeError::ResponseTimeout { .. }), "got: {:?}", err);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(bridge.pending_count(), 0);
}

#[test]
fn congestion_is_retried_once_after_cooldown() {
    let script = LoopbackScript::new().then(SendOutcome::Congested {
        retry_after: Duration::from_millis(50),
    });
    let (bridge, _event_loop) = launch_loopback(script.clone());

    let started = Instant::now();
    assert_eq!(bridge.request("hello").unwrap(), "aGVsbG8=");

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(script.sent(), vec!["hello", "hello"]);
}

#[test]
fn persistent_congestion_fails_dispatch() {
    let script = LoopbackScript::new()
        .then(SendOutcome::Congested {
            retry_after: Duration::from_millis(10),
        })
        .then(SendOutcome::Congested {
            retry_after: Duration::from_secs(60),
        });
    let (bridge, _event_loop) = launch_loopback(script.clone());

    let err = bridge.request("hello").unwrap_err();

    match &err {
        BridgeError::DispatchFailed { reason, .. } => assert_eq!(
            reason,
            &SubmitError::StillCongested {
                retry_after: Duration::from_secs(60)
            }
        ),
        other => panic!("expected DispatchFailed, got {:?}", other),
    }
    assert!(err.is_safe_to_retry());
    assert_eq!(script.sent().len(), 2, "never more than one resend");
    assert_eq!(bridge.pending_count(), 0);
}

#[test]
fn long_cooldown_does_not_stall_other_keys() {
    let settings = fast_settings();
    let script = LoopbackScript::new()
        .then(SendOutcome::Congested {
            retry_after: Duration::from_secs(4),
        })
        .reply_delay(Duration::from_millis(20));
    let (bridge, _event_loop) = launch_loopback_with(script.clone(), &settings);

    let first = {
        let bridge = bridge.clone();
        thread::spawn(move || bridge.request("first"))
    };
    assert!(wait_until(Duration::from_secs(2), || script.sent().len() == 1));

    let started = Instant::now();
    assert_eq!(bridge.request("second").unwrap(), "c2Vjb25k");
    assert!(
        started.elapsed() < settings.submit_timeout(),
        "second key waited {:?} behind the congested one",
        started.elapsed()
    );

    let err = first.join().unwrap().unwrap_err();
    assert!(
        matches!(err, BridgeError::DispatchFailed { reason: SubmitError::Expired, .. }),
        "got: {:?}",
        err
    );
    assert_eq!(script.sent(), vec!["first", "second"], "the congested text is never resent");
    assert_eq!(bridge.pending_count(), 0);
}

#[test]
fn rejected_send_fails_dispatch_without_waiting() {
    let script = LoopbackScript::new().then(SendOutcome::Rejected("peer blocked".into()));
    let (bridge, _event_loop) = launch_loopback(script);

    let started = Instant::now();
    let err = bridge.request("hello").unwrap_err();

    assert!(
        matches!(&err, BridgeError::DispatchFailed { reason: SubmitError::Rejected(r), .. } if r == "peer blocked"),
        "got: {:?}",
        err
    );
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(bridge.pending_count(), 0);
}

#[test]
fn concurrent_identical_requests_are_single_flight() {
    const WORKERS: usize = 8;
    let script = LoopbackScript::new().reply_delay(Duration::from_millis(300));
    let (bridge, _event_loop) = launch_loopback(script.clone());
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let bridge = bridge.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                bridge.request("same text")
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let delivered = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(BridgeError::DuplicateInFlight { .. })))
        .count();
    assert_eq!(delivered, 1, "results: {:?}", results);
    assert_eq!(duplicates, WORKERS - 1, "results: {:?}", results);
    assert_eq!(script.sent(), vec!["same text"], "only one send reaches the backend");
    assert_eq!(bridge.pending_count(), 0);
}

#[test]
fn distinct_keys_complete_independently() {
    let (bridge, _event_loop) = launch_loopback(LoopbackScript::new().reply_delay(Duration::from_millis(50)));

    let handles: Vec<_> = ["one", "two", "three"]
        .into_iter()
        .map(|text| {
            let bridge = bridge.clone();
            thread::spawn(move || (text, bridge.request(text)))
        })
        .collect();

    for handle in handles {
        let (text, result) = handle.join().unwrap();
        let payload = result.unwrap_or_else(|e| panic!("{} failed: {}", text, e));
        assert!(!payload.is_empty());
    }
    assert_eq!(bridge.pending_count(), 0);
}

#[test]
fn late_reply_after_timeout_is_harmless() {
    let script = LoopbackScript::new().reply_delay(Duration::from_millis(200));
    let (bridge, _event_loop) = launch_loopback(script);

    let err = bridge
        .request_with_deadline("late", Duration::from_millis(50))
        .unwrap_err();
    assert!(matches!(err, BridgeError::ResponseTimeout { .. }));

    // Let the orphaned reply arrive and be dropped
    thread::sleep(Duration::from_millis(300));
    assert_eq!(bridge.pending_count(), 0);

    assert_eq!(bridge.request("late").unwrap(), "bGF0ZQ==");
}

#[test]
fn duplicate_replies_resolve_once() {
    let (bridge, _event_loop) = launch_loopback(LoopbackScript::new().duplicate_replies());

    assert_eq!(bridge.request("hello").unwrap(), "aGVsbG8=");
    assert_eq!(bridge.request("hello").unwrap(), "aGVsbG8=");
    assert!(wait_until(Duration::from_secs(1), || bridge.pending_count() == 0));
}

#[test]
fn reply_without_payload_is_a_processing_failure() {
    let (bridge, _event_loop) = launch_loopback(LoopbackScript::new().without_payload());

    let err = bridge.request("hello").unwrap_err();

    assert!(
        matches!(
            &err,
            BridgeError::ProcessingFailure {
                source: ProcessingError::MissingPayload,
                ..
            }
        ),
        "got: {:?}",
        err
    );
    assert!(!err.is_safe_to_retry());
    assert_eq!(bridge.pending_count(), 0);
}

#[test]
fn shutdown_releases_waiting_requests() {
    let script = LoopbackScript::new().silent();
    let (bridge, event_loop) = launch_loopback(script.clone());

    let waiter = {
        let bridge = bridge.clone();
        thread::spawn(move || {
            let started = Instant::now();
            (bridge.request_with_deadline("hello", Duration::from_secs(10)), started.elapsed())
        })
    };
    // Once the backend has seen the text, the request is waiting for its reply
    assert!(wait_until(Duration::from_secs(2), || script.sent().len() == 1));

    event_loop.shutdown();

    let (result, elapsed) = waiter.join().unwrap();
    let err = result.unwrap_err();
    assert!(
        matches!(&err, BridgeError::Disconnected { key } if key == "hello"),
        "got: {:?}",
        err
    );
    assert!(!err.is_safe_to_retry(), "the text already reached the backend");
    assert!(elapsed < Duration::from_secs(5), "released well before its deadline");
    assert!(wait_until(Duration::from_secs(1), || bridge.pending_count() == 0));

    assert!(!bridge.is_connected());
    let err = bridge.request("again").unwrap_err();
    assert!(
        matches!(
            err,
            BridgeError::DispatchFailed {
                reason: SubmitError::EventLoopClosed,
                ..
            }
        ),
        "got: {:?}",
        err
    );
}

#[test]
fn failed_connect_is_reported() {
    let result = Bridge::launch(
        || async { Err::<(LoopbackBackend, InboundEvents), _>(io::Error::other("no route to bot")) },
        Arc::new(Base64Encoder),
        &fast_settings(),
    );

    match result {
        Err(StartError::Connect(message)) => assert!(message.contains("no route to bot")),
        other => panic!("expected connect error, got {:?}", other.map(|(bridge, _)| bridge)),
    }
}

#[test]
fn overall_deadline_includes_submission_time() {
    let settings = fast_settings();
    let script = LoopbackScript::new()
        .then(SendOutcome::Congested {
            retry_after: Duration::from_millis(150),
        })
        .reply_delay(Duration::from_millis(150));
    let (bridge, _event_loop) = launch_loopback_with(script, &settings);

    // Submission alone takes 150ms, leaving too little for the 150ms reply
    let started = Instant::now();
    let err = bridge
        .request_with_deadline("hello", Duration::from_millis(250))
        .unwrap_err();

    assert!(matches!(err, BridgeError::ResponseTimeout { .. }), "got: {:?}", err);
    assert!(started.elapsed() < Duration::from_millis(450));
}
