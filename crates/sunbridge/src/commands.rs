//! Subcommand implementations.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sunbridge::{AddressRouter, BridgeClient};
use sunconf::{ConfigSources, SunnyConfig};
use sunlink::{AnyTransport, Transport};
use sunproto::bridge::{BridgePath, BridgeResponse, BridgeValue};
use sunproto::osc::{OscMessage, OscValue};
use tracing::info;

/// A connected transport with a client attached. Disconnects on drop.
struct Session {
    transport: Arc<AnyTransport>,
    client: BridgeClient,
}

impl Session {
    fn open(config: &SunnyConfig) -> Result<Self> {
        let transport = Arc::new(AnyTransport::new(
            config.link.transport,
            config.link.transport_config(),
        ));
        let shared: Arc<dyn Transport> = transport.clone();
        let client = BridgeClient::new(shared, config.request_timeout());
        connect(&transport, config)?;
        Ok(Self { transport, client })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.transport.disconnect();
    }
}

fn connect(transport: &AnyTransport, config: &SunnyConfig) -> Result<()> {
    info!(
        "Connecting to {} via {}",
        config.link.host, config.link.transport
    );
    transport
        .connect()
        .with_context(|| format!("Failed to connect to bridge at {}", config.link.host))
}

/// JSON when it parses, otherwise the raw text as a string.
fn parse_value(raw: &str) -> BridgeValue {
    serde_json::from_str(raw).unwrap_or_else(|_| BridgeValue::String(raw.to_string()))
}

fn print_value(value: Option<&BridgeValue>) -> Result<()> {
    let rendered = match value {
        Some(v) => serde_json::to_string_pretty(v).context("Failed to render value")?,
        None => "null".to_string(),
    };
    println!("{}", rendered);
    Ok(())
}

pub fn get(config: &SunnyConfig, path: &str, property: &str) -> Result<()> {
    let session = Session::open(config)?;
    let value = session.client.get(BridgePath::parse(path), property)?;
    print_value(value.as_ref())
}

pub fn set(config: &SunnyConfig, path: &str, property: &str, value: &str) -> Result<()> {
    let session = Session::open(config)?;
    session
        .client
        .set(BridgePath::parse(path), property, parse_value(value))?;
    println!("ok");
    Ok(())
}

pub fn call(config: &SunnyConfig, path: &str, method: &str, args: &[String]) -> Result<()> {
    let session = Session::open(config)?;
    let args = args.iter().map(|a| parse_value(a)).collect();
    let value = session.client.call(BridgePath::parse(path), method, args)?;
    print_value(value.as_ref())
}

pub fn observe(config: &SunnyConfig, path: &str, property: &str, seconds: Option<u64>) -> Result<()> {
    let session = Session::open(config)?;
    let path = BridgePath::parse(path);
    let id = session.client.observe(
        path.clone(),
        property,
        Arc::new(|update: &BridgeResponse| {
            let line = update
                .value
                .as_ref()
                .and_then(|v| serde_json::to_string(v).ok())
                .unwrap_or_else(|| "null".to_string());
            println!("{}", line);
        }),
    )?;
    info!("Observing {}.{} ({})", path, property, id);

    match seconds {
        Some(s) => thread::sleep(Duration::from_secs(s)),
        None => loop {
            thread::park();
        },
    }

    session.client.unobserve(path, property)?;
    Ok(())
}

/// `42` is an int32, `0.5` a float32, anything else a string.
fn parse_osc_arg(raw: &str) -> OscValue {
    if let Ok(i) = raw.parse::<i32>() {
        OscValue::Int32(i)
    } else if let Ok(f) = raw.parse::<f32>() {
        OscValue::Float32(f)
    } else {
        OscValue::String(raw.to_string())
    }
}

fn format_osc(message: &OscMessage) -> String {
    let mut line = message.address.clone();
    for arg in &message.args {
        line.push(' ');
        match arg {
            OscValue::Int32(i) => line.push_str(&i.to_string()),
            OscValue::Float32(f) => line.push_str(&format!("{:?}", f)),
            OscValue::String(s) => line.push_str(&format!("{:?}", s)),
            OscValue::Blob(b) => line.push_str(&format!("<blob {} bytes>", b.len())),
        }
    }
    line
}

pub fn osc(config: &SunnyConfig, address: &str, args: &[String], wait_ms: u64) -> Result<()> {
    let mut message = OscMessage::new(address);
    message.args = args.iter().map(|a| parse_osc_arg(a)).collect();
    let packet = message
        .encode()
        .with_context(|| format!("Cannot encode OSC message for {}", address))?;

    let transport = AnyTransport::new(config.link.transport, config.link.transport_config());
    if wait_ms > 0 {
        let router = AddressRouter::new().route(
            "/",
            Arc::new(|m: &OscMessage| println!("{}", format_osc(m))),
        );
        transport.set_message_callback(router.into_message_callback());
    }
    connect(&transport, config)?;

    let sent = transport.send(&packet);
    if sent && wait_ms > 0 {
        thread::sleep(Duration::from_millis(wait_ms));
    }
    transport.disconnect();

    if !sent {
        bail!("Failed to send {} ({} bytes)", address, packet.len());
    }
    Ok(())
}

pub fn show_config(config: &SunnyConfig, sources: Option<&ConfigSources>) -> Result<()> {
    let rendered = config.to_toml()?;
    if let Some(sources) = sources {
        for file in &sources.files {
            println!("# file: {}", file.display());
        }
        for var in &sources.env_overrides {
            println!("# env: {}", var);
        }
        println!();
    }
    print!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osc_args_pick_narrowest_type() {
        assert_eq!(parse_osc_arg("42"), OscValue::Int32(42));
        assert_eq!(parse_osc_arg("-3"), OscValue::Int32(-3));
        assert_eq!(parse_osc_arg("0.5"), OscValue::Float32(0.5));
        assert_eq!(parse_osc_arg("kick"), OscValue::String("kick".to_string()));
    }

    #[test]
    fn bridge_values_fall_back_to_strings() {
        assert_eq!(parse_value("128"), BridgeValue::Int(128));
        assert_eq!(parse_value("true"), BridgeValue::Bool(true));
        assert_eq!(parse_value("[1.5, 2]"), BridgeValue::DoubleArray(vec![1.5, 2.0]));
        assert_eq!(parse_value("Bass"), BridgeValue::String("Bass".to_string()));
    }

    #[test]
    fn formats_messages_for_humans() {
        let message = OscMessage::new("/sunny/listen/tempo")
            .with_arg(128.5f32)
            .with_arg("song");
        assert_eq!(format_osc(&message), "/sunny/listen/tempo 128.5 \"song\"");
    }
}
