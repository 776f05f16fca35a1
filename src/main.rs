//! Demonstration harness: loads a static configuration, wires it to the engine, and
//! replays recorded frames against it so the engine is exercisable without a real
//! NIC. The actual packet-injection driver (raw sockets, a TAP device, a VNS
//! connection) lives outside this crate; this binary is not it (spec.md §1 [AMBIENT]).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use router::config::RouterConfig;
use router::{PacketDriver, Router};

#[derive(Parser, Debug)]
#[command(name = "router", about = "IPv4 forwarding plane with optional NAT")]
struct Args {
    /// Path to the TOML configuration file describing interfaces, routes, and NAT.
    #[arg(long)]
    config: PathBuf,

    /// Path to a file of newline-separated "interface_name hex_bytes" frames to
    /// replay through the engine, one per line.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

/// A driver that logs every outbound frame instead of sending it anywhere real.
struct LoggingDriver;

impl PacketDriver for LoggingDriver {
    fn send_frame(&self, interface_name: &str, frame: &[u8]) {
        info!(interface_name, bytes = frame.len(), "send_frame");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    info!(config = %args.config.display(), "loading configuration");
    let config = RouterConfig::load(&args.config)?;
    let interfaces = config.interfaces()?;
    let routes = config.routes();
    let nat = config.nat();

    let router = Router::new(interfaces, routes, nat, Box::new(LoggingDriver));

    if let Some(replay_path) = &args.replay {
        replay_frames(&router, replay_path)?;
    } else {
        info!("no --replay file given, engine is idle (sweepers still running)");
        std::thread::sleep(std::time::Duration::from_secs(1));
    }

    Ok(())
}

/// Replays each line of `path` as "interface_name hex_bytes" through the engine.
fn replay_frames(router: &Router, path: &PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading replay file {}", path.display()))?;
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (interface_name, hex) = line.split_once(char::is_whitespace).with_context(|| format!("replay line {} missing interface name", line_no + 1))?;
        let bytes = decode_hex(hex.trim()).with_context(|| format!("replay line {} has invalid hex", line_no + 1))?;
        info!(interface_name, bytes = bytes.len(), line = line_no + 1, "handle_frame");
        router.handle_frame(interface_name, &bytes);
    }
    Ok(())
}

fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        anyhow::bail!("hex string has odd length");
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).with_context(|| format!("invalid hex byte at offset {i}")))
        .collect()
}
