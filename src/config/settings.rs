use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::RetryPolicy;

/// Top-level configuration, one section per component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub server: ServerSettings,
    pub bridge: BridgeSettings,
    pub backend: BackendSettings,
}

/// HTTP front-end.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8124,
        }
    }
}

/// Correlation bridge timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeSettings {
    /// Overall deadline for a request, submission included.
    pub response_timeout_secs: u64,
    /// How long a worker waits for the backend to accept a message.
    pub submit_timeout_secs: u64,
    /// Added to the cooldown a congested backend asks for.
    pub cooldown_padding_ms: u64,
    /// How long startup waits for the backend to connect.
    pub connect_timeout_secs: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            response_timeout_secs: 30,
            submit_timeout_secs: 10,
            cooldown_padding_ms: 1000,
            connect_timeout_secs: 15,
        }
    }
}

impl BridgeSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            cooldown_padding: Duration::from_millis(self.cooldown_padding_ms),
        }
    }
}

/// Which backend the event loop connects to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process simulated synthesis bot.
    #[default]
    Loopback,
    /// Child process speaking JSON lines over stdio.
    Process,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// Command line of the process backend.
    pub cmd: Vec<String>,
    /// Reply delay of the loopback backend.
    pub reply_delay_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Loopback,
            cmd: Vec::new(),
            reply_delay_ms: 200,
        }
    }
}

impl BackendSettings {
    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }
}
