//! Backend running as a child process that speaks JSON lines over stdio.
//!
//! Each send writes `{"text": "..."}` followed by a newline to the child's
//! stdin. Each line the child prints to stdout is a reply of the form
//! `{"reply_to": "...", "payload": "<base64>"}`, where both fields may be
//! omitted or null.

use std::io;
use std::process::Stdio;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

use super::{BackendChannel, INBOUND_QUEUE_CAPACITY, InboundEvent, InboundEvents, SendOutcome};
use crate::payload::decode_base64;

#[derive(Debug, Serialize)]
struct OutboundLine<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReplyLine {
    #[serde(default)]
    reply_to: Option<String>,
    #[serde(default)]
    payload: Option<String>,
}

/// Connection to a synthesis bot running as a child process.
///
/// The child is killed when the backend is dropped.
#[derive(Debug)]
pub struct ProcessBackend {
    stdin: tokio::sync::Mutex<ChildStdin>,
    _child: Child,
}

impl ProcessBackend {
    /// Spawn `cmd` (program followed by its arguments) and start reading its
    /// replies.
    ///
    /// Must be called within a tokio runtime; the reader runs as a task on it.
    pub async fn spawn(cmd: &[String]) -> io::Result<(Self, InboundEvents)> {
        let (program, args) = cmd.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty backend command")
        })?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("failed to capture child stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("failed to capture child stdout"))?;

        info!(
            target: "koebashi::backend::process",
            "Spawned backend process {} (pid {:?})",
            program,
            child.id()
        );

        let (tx, rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        tokio::spawn(read_replies(stdout, tx));

        Ok((
            Self {
                stdin: tokio::sync::Mutex::new(stdin),
                _child: child,
            },
            rx,
        ))
    }

    async fn write_line(&self, text: &str) -> io::Result<()> {
        let mut line = serde_json::to_vec(&OutboundLine { text })?;
        line.push(b'\n');

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(&line).await?;
        stdin.flush().await
    }
}

impl BackendChannel for ProcessBackend {
    async fn send(&self, text: &str) -> SendOutcome {
        match self.write_line(text).await {
            Ok(()) => SendOutcome::Accepted,
            Err(e) => {
                warn!(
                    target: "koebashi::backend::process",
                    "Failed to write to backend process: {}",
                    e
                );
                SendOutcome::Rejected(e.to_string())
            }
        }
    }
}

/// Forward reply lines from the child's stdout until EOF.
async fn read_replies(stdout: ChildStdout, tx: mpsc::Sender<InboundEvent>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!(
                    target: "koebashi::backend::process",
                    "Backend process closed stdout"
                );
                break;
            }
            Err(e) => {
                warn!(
                    target: "koebashi::backend::process",
                    "Failed to read from backend process: {}",
                    e
                );
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        let Some(event) = parse_reply(&line) else {
            continue;
        };
        if tx.send(event).await.is_err() {
            debug!(
                target: "koebashi::backend::process",
                "Event loop gone, reader exiting"
            );
            break;
        }
    }
}

/// Parse one reply line. Malformed lines are logged and skipped; a payload
/// that is not valid base64 is treated as missing.
fn parse_reply(line: &str) -> Option<InboundEvent> {
    let reply: ReplyLine = match serde_json::from_str(line) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(
                target: "koebashi::backend::process",
                "Skipping malformed reply line: {}",
                e
            );
            return None;
        }
    };

    let payload = reply.payload.and_then(|encoded| match decode_base64(&encoded) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(
                target: "koebashi::backend::process",
                "Discarding undecodable payload: {}",
                e
            );
            None
        }
    });

    Some(InboundEvent {
        reply_to: reply.reply_to,
        payload,
    })
}
