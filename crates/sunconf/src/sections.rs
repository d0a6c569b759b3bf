//! Config file sections.

use serde::{Deserialize, Serialize};
use sunlink::{TransportConfig, TransportKind};

/// How to reach the DAW bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// `stream` (length-framed TCP) or `datagram` (UDP).
    /// Default: stream
    #[serde(default)]
    pub transport: TransportKind,

    /// Default: 127.0.0.1
    #[serde(default = "LinkConfig::default_host")]
    pub host: String,

    /// Default: 9001
    #[serde(default = "LinkConfig::default_stream_port")]
    pub stream_port: u16,

    /// Default: 9002
    #[serde(default = "LinkConfig::default_datagram_port")]
    pub datagram_port: u16,

    /// Local UDP receive port. 0 picks an ephemeral port.
    #[serde(default)]
    pub datagram_bind_port: u16,

    /// Default: 5000
    #[serde(default = "LinkConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// First reconnect delay, doubled per failed attempt.
    /// Default: 1000
    #[serde(default = "LinkConfig::default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Default: 30000
    #[serde(default = "LinkConfig::default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

impl LinkConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_stream_port() -> u16 {
        TransportConfig::DEFAULT_STREAM_PORT
    }

    fn default_datagram_port() -> u16 {
        TransportConfig::DEFAULT_DATAGRAM_PORT
    }

    fn default_connect_timeout_ms() -> u64 {
        5000
    }

    fn default_retry_delay_ms() -> u64 {
        1000
    }

    fn default_max_retry_delay_ms() -> u64 {
        30_000
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.host.clone())
            .with_stream_port(self.stream_port)
            .with_datagram_port(self.datagram_port)
            .with_datagram_bind_port(self.datagram_bind_port)
            .with_connect_timeout_ms(self.connect_timeout_ms)
            .with_retry_delay_ms(self.retry_delay_ms)
            .with_max_retry_delay_ms(self.max_retry_delay_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            host: Self::default_host(),
            stream_port: Self::default_stream_port(),
            datagram_port: Self::default_datagram_port(),
            datagram_bind_port: 0,
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            retry_delay_ms: Self::default_retry_delay_ms(),
            max_retry_delay_ms: Self::default_max_retry_delay_ms(),
        }
    }
}

/// Request/response behaviour of the bridge client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// How long to wait for a correlated response.
    /// Default: 5000
    #[serde(default = "RequestConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl RequestConfig {
    fn default_timeout_ms() -> u64 {
        5000
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// An `EnvFilter` directive, e.g. `info` or `sunlink=debug,info`.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
