//! In-process backend that answers every accepted text with its own bytes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use super::{BackendChannel, INBOUND_QUEUE_CAPACITY, InboundEvent, InboundEvents, SendOutcome};

/// Behavior of a [`LoopbackBackend`].
///
/// Clones share the record of sent texts, so a caller can keep one clone
/// and inspect what the backend saw after handing the other to the bridge.
#[derive(Debug, Clone)]
pub struct LoopbackScript {
    outcomes: VecDeque<SendOutcome>,
    reply_delay: Duration,
    silent: bool,
    duplicate_replies: bool,
    without_payload: bool,
    sent: Arc<Mutex<Vec<String>>>,
}

impl Default for LoopbackScript {
    fn default() -> Self {
        Self {
            outcomes: VecDeque::new(),
            reply_delay: Duration::ZERO,
            silent: false,
            duplicate_replies: false,
            without_payload: false,
            sent: Arc::default(),
        }
    }
}

impl LoopbackScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next send. Once the queue is empty every
    /// send is accepted.
    pub fn then(mut self, outcome: SendOutcome) -> Self {
        self.outcomes.push_back(outcome);
        self
    }

    pub fn reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    /// Accept sends but never reply.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Deliver every reply twice.
    pub fn duplicate_replies(mut self) -> Self {
        self.duplicate_replies = true;
        self
    }

    /// Reply without a payload.
    pub fn without_payload(mut self) -> Self {
        self.without_payload = true;
        self
    }

    /// Every text handed to the backend so far, resends included.
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Simulated synthesis bot living inside the event loop.
#[derive(Debug)]
pub struct LoopbackBackend {
    outcomes: RefCell<VecDeque<SendOutcome>>,
    script: LoopbackScript,
    events: mpsc::Sender<InboundEvent>,
}

impl LoopbackBackend {
    /// Connect a loopback backend following `script`.
    ///
    /// Must be called within a tokio runtime; replies are delivered by
    /// tasks spawned on it.
    pub async fn connect(script: LoopbackScript) -> io::Result<(Self, InboundEvents)> {
        let (events, rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let backend = Self {
            outcomes: RefCell::new(script.outcomes.clone()),
            script,
            events,
        };
        Ok((backend, rx))
    }

    fn schedule_reply(&self, text: &str) {
        if self.script.silent {
            return;
        }
        let payload = (!self.script.without_payload).then(|| text.as_bytes().to_vec());
        let event = InboundEvent {
            reply_to: Some(text.to_string()),
            payload,
        };
        let copies = if self.script.duplicate_replies { 2 } else { 1 };
        let delay = self.script.reply_delay;
        let events = self.events.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for _ in 0..copies {
                if events.send(event.clone()).await.is_err() {
                    break;
                }
            }
        });
    }
}

impl BackendChannel for LoopbackBackend {
    async fn send(&self, text: &str) -> SendOutcome {
        self.script
            .sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());

        let outcome = self
            .outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or(SendOutcome::Accepted);
        if outcome == SendOutcome::Accepted {
            self.schedule_reply(text);
        }
        outcome
    }
}
