use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection parameters, fixed once built. Always supplied by the caller;
/// nothing in this crate reads files or the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    host: String,
    stream_port: u16,
    datagram_port: u16,
    datagram_bind_port: u16,
    connect_timeout: Duration,
    retry_delay: Duration,
    max_retry_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

impl TransportConfig {
    pub const DEFAULT_STREAM_PORT: u16 = 9001;
    pub const DEFAULT_DATAGRAM_PORT: u16 = 9002;

    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            stream_port: Self::DEFAULT_STREAM_PORT,
            datagram_port: Self::DEFAULT_DATAGRAM_PORT,
            datagram_bind_port: 0,
            connect_timeout: Duration::from_millis(5000),
            retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_millis(30_000),
        }
    }

    pub fn with_stream_port(mut self, port: u16) -> Self {
        self.stream_port = port;
        self
    }

    pub fn with_datagram_port(mut self, port: u16) -> Self {
        self.datagram_port = port;
        self
    }

    /// Local UDP port to receive on. 0 picks an ephemeral port.
    pub fn with_datagram_bind_port(mut self, port: u16) -> Self {
        self.datagram_bind_port = port;
        self
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        // a zero timeout is rejected by the OS
        self.connect_timeout = Duration::from_millis(ms.max(1));
        self
    }

    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay = Duration::from_millis(ms);
        self
    }

    pub fn with_max_retry_delay_ms(mut self, ms: u64) -> Self {
        self.max_retry_delay = Duration::from_millis(ms);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn stream_port(&self) -> u16 {
        self.stream_port
    }

    pub fn datagram_port(&self) -> u16 {
        self.datagram_port
    }

    pub fn datagram_bind_port(&self) -> u16 {
        self.datagram_bind_port
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stream,
    Datagram,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stream => "stream",
            TransportKind::Datagram => "datagram",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stream" | "tcp" => Ok(TransportKind::Stream),
            "datagram" | "udp" => Ok(TransportKind::Datagram),
            other => Err(format!("unknown transport '{}' (expected stream or datagram)", other)),
        }
    }
}
