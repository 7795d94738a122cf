//! The bridge's single-threaded event loop.
//!
//! The loop owns the backend connection. It runs on a dedicated thread with
//! a current-thread tokio runtime and drives two pumps cooperatively:
//!
//! - the submission pump, sending text handed over by the dispatcher
//! - the completion pump, correlating inbound events with waiting requests
//!
//! When the loop stops for any reason, every still-waiting request is
//! failed so no worker sits out its full deadline.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::completion;
use super::correlation::CorrelationTable;
use super::dispatcher::{Dispatcher, RetryPolicy, Submission, submission_pump};
use super::signal::{self, Signal, Wait};
use crate::backend::{BackendChannel, InboundEvents};
use crate::config::BridgeSettings;
use crate::error::StartError;
use crate::payload::PayloadEncoder;

const THREAD_NAME: &str = "koebashi-event-loop";

/// Handle to the running event loop thread.
///
/// Dropping the handle stops the loop and joins its thread.
pub struct EventLoop {
    cancel_token: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl EventLoop {
    /// Start the event loop and connect the backend inside it.
    ///
    /// `connect` runs on the loop's own runtime, so backends may spawn tasks
    /// and child processes there. Blocks until the backend is connected or
    /// the configured connect timeout passes.
    pub fn start<C, Fut, B>(
        connect: C,
        table: Arc<CorrelationTable>,
        encoder: Arc<dyn PayloadEncoder>,
        settings: &BridgeSettings,
    ) -> Result<(Self, Dispatcher), StartError>
    where
        C: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<(B, InboundEvents)>> + 'static,
        B: BackendChannel + 'static,
    {
        let cancel_token = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready, ready_wait) = signal::channel();
        let policy = settings.retry_policy();

        let token = cancel_token.clone();
        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        ready.fire(Err(StartError::Io(e)));
                        return;
                    }
                };
                runtime.block_on(run(connect, rx, table, encoder, policy, token, ready));
            })?;

        let mut event_loop = Self {
            cancel_token,
            thread: Some(thread),
        };

        let connect_timeout = settings.connect_timeout();
        match ready_wait.wait(connect_timeout) {
            Wait::Signaled(Ok(())) => Ok((event_loop, Dispatcher::new(tx, settings.submit_timeout()))),
            Wait::Signaled(Err(e)) => {
                event_loop.stop();
                Err(e)
            }
            Wait::TimedOut => {
                event_loop.stop();
                Err(StartError::ConnectTimeout(connect_timeout))
            }
            Wait::Abandoned => {
                event_loop.stop();
                Err(StartError::Connect(
                    "event loop exited during startup".to_string(),
                ))
            }
        }
    }

    /// Whether the loop thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop the loop and wait for its thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.cancel_token.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(
                    target: "koebashi::bridge::event_loop",
                    "Event loop thread panicked"
                );
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run<C, Fut, B>(
    connect: C,
    submissions: mpsc::UnboundedReceiver<Submission>,
    table: Arc<CorrelationTable>,
    encoder: Arc<dyn PayloadEncoder>,
    policy: RetryPolicy,
    cancel_token: CancellationToken,
    ready: Signal<Result<(), StartError>>,
) where
    C: FnOnce() -> Fut,
    Fut: Future<Output = io::Result<(B, InboundEvents)>>,
    B: BackendChannel,
{
    let connected = tokio::select! {
        _ = cancel_token.cancelled() => return,
        connected = connect() => connected,
    };
    let (backend, events) = match connected {
        Ok(connected) => connected,
        Err(e) => {
            ready.fire(Err(StartError::Connect(e.to_string())));
            return;
        }
    };

    if !ready.fire(Ok(())) {
        debug!(
            target: "koebashi::bridge::event_loop",
            "Starter stopped waiting, abandoning connected backend"
        );
        return;
    }
    info!(
        target: "koebashi::bridge::event_loop",
        "Backend connected, event loop running"
    );

    tokio::select! {
        _ = cancel_token.cancelled() => {
            info!(target: "koebashi::bridge::event_loop", "Event loop stopping");
        }
        _ = submission_pump(&backend, submissions, policy) => {
            info!(target: "koebashi::bridge::event_loop", "All dispatchers dropped");
        }
        _ = completion_pump(events, &table, encoder.as_ref()) => {
            warn!(target: "koebashi::bridge::event_loop", "Backend event stream ended");
        }
    }

    let released = table.release_all();
    if released > 0 {
        warn!(
            target: "koebashi::bridge::event_loop",
            "Released {} waiting request(s) on shutdown",
            released
        );
    }
}

async fn completion_pump(mut events: InboundEvents, table: &CorrelationTable, encoder: &dyn PayloadEncoder) {
    while let Some(event) = events.recv().await {
        completion::handle_event(event, table, encoder);
    }
}
