//! Cross-context dispatcher from worker threads into the event loop.
//!
//! Workers call [`Dispatcher::submit`], which posts a [`Submission`] onto
//! the event loop's queue and blocks for the immediate acknowledgment only.
//! The event loop runs [`submission_pump`], which handles one submission at
//! a time, so a congestion cooldown never interleaves with another send.

use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::sync::mpsc;

use super::signal::{self, Signal, Wait};
use crate::backend::{BackendChannel, SendOutcome};
use crate::error::SubmitError;

/// How the event loop reacts to a congestion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra time added to the cooldown the backend asks for.
    pub cooldown_padding: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cooldown_padding: Duration::from_secs(1),
        }
    }
}

/// A request to send text over the backend, waiting in the event loop's queue.
#[derive(Debug)]
pub(crate) struct Submission {
    text: String,
    ack: Signal<Result<(), SubmitError>>,
    /// When the submitting worker stops waiting for the acknowledgment.
    expires_at: Instant,
}

impl Submission {
    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Whether the submitter will have stopped waiting once `delay` elapses.
    fn expires_within(&self, delay: Duration) -> bool {
        Instant::now() + delay >= self.expires_at
    }

    /// Report the result back to the submitting worker.
    ///
    /// Returns `false` if the worker already stopped waiting.
    pub(crate) fn acknowledge(self, result: Result<(), SubmitError>) -> bool {
        self.ack.fire(result)
    }
}

/// Worker-side handle onto the event loop's submission queue.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Submission>,
    ack_timeout: Duration,
}

impl Dispatcher {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Submission>, ack_timeout: Duration) -> Self {
        Self { tx, ack_timeout }
    }

    /// Hand `text` to the backend and wait for the immediate acknowledgment.
    ///
    /// Blocks the calling thread for at most the acknowledgment timeout.
    /// `Ok(())` means the backend accepted the text for delivery.
    pub fn submit(&self, text: &str) -> Result<(), SubmitError> {
        let (ack, wait) = signal::channel();
        let submission = Submission {
            text: text.to_string(),
            ack,
            expires_at: Instant::now() + self.ack_timeout,
        };

        self.tx
            .send(submission)
            .map_err(|_| SubmitError::EventLoopClosed)?;

        match wait.wait(self.ack_timeout) {
            Wait::Signaled(result) => result,
            Wait::TimedOut => Err(SubmitError::AckTimeout(self.ack_timeout)),
            Wait::Abandoned => Err(SubmitError::EventLoopClosed),
        }
    }

    /// Whether the event loop is still accepting submissions.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Process submissions one at a time until the queue closes.
pub(crate) async fn submission_pump<B: BackendChannel>(
    backend: &B,
    mut rx: mpsc::UnboundedReceiver<Submission>,
    policy: RetryPolicy,
) {
    while let Some(submission) = rx.recv().await {
        let result = deliver(backend, &submission, policy).await;
        if !submission.acknowledge(result) {
            debug!(
                target: "koebashi::bridge::dispatcher",
                "Submitter stopped waiting before acknowledgment"
            );
        }
    }
    debug!(
        target: "koebashi::bridge::dispatcher",
        "Submission queue closed, pump exiting"
    );
}

/// Send one submission, resending once after a congestion cooldown.
async fn deliver<B: BackendChannel>(
    backend: &B,
    submission: &Submission,
    policy: RetryPolicy,
) -> Result<(), SubmitError> {
    // The worker already gave up; sending now would only produce an orphan reply
    if submission.is_expired() {
        return Err(SubmitError::Expired);
    }

    match backend.send(submission.text()).await {
        SendOutcome::Accepted => Ok(()),
        SendOutcome::Rejected(reason) => Err(SubmitError::Rejected(reason)),
        SendOutcome::Congested { retry_after } => {
            let cooldown = retry_after + policy.cooldown_padding;
            // Sleeping past the submitter's deadline would hold up the whole queue
            if submission.expires_within(cooldown) {
                warn!(
                    target: "koebashi::bridge::dispatcher",
                    "Backend congested for {:?}, longer than the submitter waits; giving up",
                    cooldown
                );
                return Err(SubmitError::Expired);
            }
            warn!(
                target: "koebashi::bridge::dispatcher",
                "Backend congested, resending in {:?}",
                cooldown
            );
            tokio::time::sleep(cooldown).await;

            if submission.is_expired() {
                return Err(SubmitError::Expired);
            }

            match backend.send(submission.text()).await {
                SendOutcome::Accepted => Ok(()),
                SendOutcome::Rejected(reason) => Err(SubmitError::Rejected(reason)),
                SendOutcome::Congested { retry_after } => {
                    Err(SubmitError::StillCongested { retry_after })
                }
            }
        }
    }
}
