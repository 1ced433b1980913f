//! Joylink terminal front-end
//!
//! Connects to the peripheral, prints joystick updates and forwards typed
//! commands to the LED.
//!
//! Usage: joylink [--list] [--config FILE] [PORT]
//!
//! Commands on stdin:
//!   l <0-255>          set LED brightness
//!   pos <x> <width>    set brightness from a pointer position
//!   blink              blink the LED once
//!   quit               disconnect and exit

use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use joylink_core::protocol::{
    brightness_from_position, list_ports, ConnectionStatus, OutboundCommand, SerialPortProvider,
    SerialSession, SessionConfig,
};

/// How often the device state is polled for display
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Args {
    list: bool,
    config: Option<String>,
    port: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--list" | "-l" => args.list = true,
            "--config" | "-c" => {
                args.config = Some(iter.next().context("--config needs a file path")?);
            }
            "--help" | "-h" => {
                println!("Usage: joylink [--list] [--config FILE] [PORT]");
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            other => args.port = Some(other.to_string()),
        }
    }
    Ok(args)
}

enum Input {
    Command(OutboundCommand),
    Quit,
}

fn parse_input(line: &str) -> Result<Option<Input>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let input = match verb.to_ascii_lowercase().as_str() {
        "l" | "led" => {
            let level: u8 = words
                .next()
                .context("missing brightness")?
                .parse()
                .context("brightness must be 0-255")?;
            Input::Command(OutboundCommand::SetBrightness { level })
        }
        "pos" => {
            let x: f64 = words.next().context("missing x")?.parse()?;
            let width: f64 = words.next().context("missing width")?.parse()?;
            Input::Command(brightness_from_position(x, width))
        }
        "blink" | "b" => Input::Command(OutboundCommand::Blink),
        "quit" | "q" | "exit" => Input::Quit,
        other => bail!("unknown command: {other}"),
    };
    Ok(Some(input))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;

    if args.list {
        let ports = list_ports();
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!(
                "{}\t{}\t{}\t{}",
                port.name,
                port.usb_id().unwrap_or_else(|| "-".into()),
                port.known_vendor()
                    .or(port.manufacturer.as_deref())
                    .unwrap_or_default(),
                port.product.as_deref().unwrap_or_default()
            );
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => SessionConfig::default(),
    };
    if let Some(port) = args.port {
        config.port_name = Some(port);
    }

    let session = SerialSession::new(SerialPortProvider::from_config(&config), config);
    session.connect().await.context("failed to connect")?;

    let commands = session.commands();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut last_shown = None;

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_input(&line) {
                    Ok(Some(Input::Command(cmd))) => commands.send(cmd),
                    Ok(Some(Input::Quit)) => break,
                    Ok(None) => {}
                    Err(e) => warn!("{e:#}"),
                }
            }

            _ = ticker.tick() => {
                match session.status() {
                    ConnectionStatus::Connected => {}
                    status => {
                        let reason = session.state().last_error().unwrap_or_default();
                        bail!("link lost ({status:?}) {reason}");
                    }
                }
                let snapshot = session.snapshot();
                if last_shown != Some(snapshot) {
                    println!(
                        "x={:4} y={:4} mode={}",
                        snapshot.joystick_x, snapshot.joystick_y, snapshot.mode
                    );
                    last_shown = Some(snapshot);
                }
            }
        }
    }

    session.disconnect().await;
    let stats = session.state().stats();
    info!(
        rx_bytes = stats.rx_bytes,
        tx_bytes = stats.tx_bytes,
        frames = stats.frames_applied,
        dropped = stats.lines_dropped,
        "session closed"
    );
    Ok(())
}
