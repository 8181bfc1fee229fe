//! RGB lamp console entry point.
//!
//! A terminal control panel for an RGB lamp on a serial port.  Lines typed at
//! the prompt become `AUTO` / `MANUAL` / `RGB:r,g,b` / `EFFECT:NAME` commands;
//! `TEMP:<value>` readings printed by the board are shown as they arrive.
//!
//! # Usage
//!
//! ```text
//! lamp-console [OPTIONS]
//!
//! Options:
//!   -p, --port <PATH>      Serial device, e.g. /dev/ttyACM0 or COM3
//!       --baud <RATE>      Baud rate [default: 9600]
//!       --config <PATH>    TOML config file
//!       --connect          Open the port right away
//!       --dry-run          Use an in-memory loopback port instead of hardware
//!       --list-ports       Print the available serial ports and exit
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable      | Description            |
//! |---------------|------------------------|
//! | `LAMP_PORT`   | Serial device path     |
//! | `LAMP_BAUD`   | Baud rate              |
//! | `LAMP_CONFIG` | Config file path       |
//! | `RUST_LOG`    | `tracing` filter       |
//!
//! Command-line flags win over environment variables, which win over the
//! config file, which wins over the built-in defaults.
//!
//! # Architecture overview
//!
//! ```text
//! stdin lines ──► console::parse_command ──► ControlLampUseCase ──► DeviceLink ──► serial port
//!                                                                      │
//! stdout ◄── LinkEvent / temperature watch ◄─────── read loop ◄────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lamp_console::application::control_lamp::{CommandSink, ControlLampUseCase};
use lamp_console::infrastructure::console::{
    parse_command, ConsoleCommand, PanelSnapshot, HELP_TEXT,
};
use lamp_console::infrastructure::device_link::{
    mock::MockPortOpener,
    serial::{available_ports, SerialPortOpener},
    DeviceLink, DisconnectReason, LinkEvent, LinkState, PortOpener, PortSettings,
};
use lamp_console::infrastructure::storage::config::{load_config, load_config_from, AppConfig};
use lamp_core::PanelGesture;

/// Port name used by `--dry-run` when none is configured.
const DRY_RUN_PORT: &str = "loopback";

/// How often the dry-run board prints a temperature.
const SIMULATED_READING_PERIOD: Duration = Duration::from_secs(2);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial control panel for an RGB lamp.
#[derive(Debug, Parser)]
#[command(
    name = "lamp-console",
    about = "Terminal control panel for a serial-attached RGB lamp",
    version
)]
struct Cli {
    /// Serial device to open, e.g. `/dev/ttyACM0` or `COM3`.
    #[arg(short, long, env = "LAMP_PORT")]
    port: Option<String>,

    /// Baud rate.  The lamp firmware listens at 9600.
    #[arg(long, env = "LAMP_BAUD")]
    baud: Option<u32>,

    /// TOML config file.  Defaults to `config.toml` in the platform config
    /// directory.
    #[arg(long, env = "LAMP_CONFIG")]
    config: Option<PathBuf>,

    /// Open the serial port on start-up.
    #[arg(long)]
    connect: bool,

    /// Talk to an in-memory loopback port instead of real hardware.  Sent
    /// commands are echoed back and a simulated temperature is printed.
    #[arg(long)]
    dry_run: bool,

    /// Print the available serial ports and exit.
    #[arg(long)]
    list_ports: bool,
}

/// Settings the console runs with after merging flags and the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RunConfig {
    port: Option<String>,
    baud_rate: u32,
    read_timeout: Duration,
    connect_on_start: bool,
    dry_run: bool,
}

impl Cli {
    /// Loads the config file named by `--config`, or the default one.
    fn load_file_config(&self) -> anyhow::Result<AppConfig> {
        match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display())),
            None => load_config().context("failed to load config"),
        }
    }

    /// Merges the parsed flags over `file`.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero baud rate or read timeout, or when
    /// start-up connection is requested without any port.
    fn into_run_config(self, file: AppConfig) -> anyhow::Result<RunConfig> {
        let baud_rate = self.baud.unwrap_or(file.serial.baud_rate);
        if baud_rate == 0 {
            bail!("baud rate must be greater than zero");
        }
        if file.serial.read_timeout_ms == 0 {
            bail!("serial.read_timeout_ms must be greater than zero");
        }

        let mut port = self.port.or(file.serial.port);
        if self.dry_run && port.is_none() {
            port = Some(DRY_RUN_PORT.to_string());
        }

        let connect_on_start = self.connect || file.console.connect_on_start;
        if connect_on_start && port.is_none() {
            bail!("--connect needs a serial port: pass --port or set serial.port in the config");
        }

        Ok(RunConfig {
            port,
            baud_rate,
            read_timeout: Duration::from_millis(file.serial.read_timeout_ms),
            connect_on_start,
            dry_run: self.dry_run,
        })
    }
}

// ── Console session ───────────────────────────────────────────────────────────

/// What the loop should do after a command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct Console {
    link: Arc<DeviceLink>,
    control: ControlLampUseCase,
    config: RunConfig,
}

impl Console {
    async fn connect(&self, port: Option<String>) {
        let Some(path) = port.or_else(|| self.config.port.clone()) else {
            println!("no serial port configured; use 'connect PORT' (see 'ports')");
            return;
        };
        let settings = PortSettings {
            path,
            baud_rate: self.config.baud_rate,
            read_timeout: self.config.read_timeout,
        };
        if let Err(e) = self.link.open(settings).await {
            println!("connect failed: {e}");
        }
    }

    async fn disconnect(&self) {
        if self.link.state() != LinkState::Connected {
            println!("not connected");
            return;
        }
        if let Err(e) = self.link.close().await {
            warn!("disconnect: {e}");
        }
    }

    fn gesture(&mut self, gesture: PanelGesture) {
        // The serial write blocks; let the runtime move other tasks meanwhile.
        let result = tokio::task::block_in_place(|| self.control.handle(gesture));
        match result {
            Ok(sent) if sent.is_empty() => println!("ignored in auto mode; select 'manual' first"),
            Ok(sent) => {
                for command in &sent {
                    println!("> {command}");
                }
                if self.link.state() != LinkState::Connected {
                    println!("(not connected: panel updated, nothing sent)");
                }
            }
            Err(e) => println!("{e}"),
        }
    }

    fn status(&self, json: bool) {
        let temperature = self.link.temperature().borrow().clone();
        let snapshot = PanelSnapshot::new(self.link.state(), self.control.state(), &temperature);
        if !json {
            println!("{}", snapshot.render());
            return;
        }
        match snapshot.to_json() {
            Ok(text) => println!("{text}"),
            Err(e) => error!("could not encode status: {e}"),
        }
    }

    async fn dispatch(&mut self, command: ConsoleCommand) -> Flow {
        match command {
            ConsoleCommand::Connect { port } => self.connect(port).await,
            ConsoleCommand::Disconnect => self.disconnect().await,
            ConsoleCommand::Gesture(gesture) => self.gesture(gesture),
            ConsoleCommand::Status { json } => self.status(json),
            ConsoleCommand::Ports => print_ports(),
            ConsoleCommand::Help => println!("{HELP_TEXT}"),
            ConsoleCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }
}

fn print_ports() {
    match available_ports() {
        Ok(ports) if ports.is_empty() => println!("no serial ports found"),
        Ok(ports) => {
            for port in ports {
                println!("{:<24} {}", port.name, port.kind);
            }
        }
        Err(e) => println!("could not list serial ports: {e}"),
    }
}

/// One line of the dry-run board's output: a slow triangle wave between
/// 20.0 and 24.5 degrees.
fn simulated_reading(tick: u32) -> String {
    let step = tick % 18;
    let offset = if step < 9 { step } else { 18 - step };
    format!("TEMP:{:.1}\r\n", 20.0 + f64::from(offset) * 0.5)
}

/// Feeds a simulated reading into the loopback port every period.
fn spawn_simulated_board(opener: Arc<MockPortOpener>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SIMULATED_READING_PERIOD);
        let mut tick = 0u32;
        loop {
            ticker.tick().await;
            // Dropped while disconnected.
            opener.feed_text(&simulated_reading(tick));
            tick = tick.wrapping_add(1);
        }
    })
}

fn print_link_event(event: &LinkEvent) {
    match event {
        LinkEvent::Connected { port } => println!("connected to {port}"),
        LinkEvent::Disconnected { reason } => match reason {
            DisconnectReason::Closed => println!("disconnected"),
            DisconnectReason::EndOfStream => println!("device closed the connection"),
            DisconnectReason::ReadFailed(msg) => println!("connection lost: {msg}"),
        },
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the config file is loaded.
/// 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins; otherwise the
///    config's `console.log_level` is used.  Logs go to stderr so they do not
///    mix with the panel output.
/// 3. The device link is created over either the real serial opener or the
///    in-memory loopback one (`--dry-run`), which also gets a simulated
///    board printing temperatures.
/// 4. The console loop `select!`s over stdin, link events, temperature
///    updates and Ctrl+C until `quit`, end of input, or Ctrl+C.
/// 5. The link is closed so the read task exits before the process does.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file_config = cli.load_file_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    let log_level = file_config.console.log_level.clone();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    if cli.list_ports {
        let ports = available_ports().context("failed to list serial ports")?;
        for port in ports {
            println!("{:<24} {}", port.name, port.kind);
        }
        return Ok(());
    }

    let config = cli.into_run_config(file_config)?;
    info!(
        port = config.port.as_deref().unwrap_or("-"),
        baud = config.baud_rate,
        dry_run = config.dry_run,
        "lamp console starting"
    );

    // ── Device link ───────────────────────────────────────────────────────────
    let (opener, simulator): (Arc<dyn PortOpener>, Option<JoinHandle<()>>) = if config.dry_run {
        let loopback = Arc::new(MockPortOpener::loopback());
        let simulator = spawn_simulated_board(Arc::clone(&loopback));
        (loopback, Some(simulator))
    } else {
        (Arc::new(SerialPortOpener), None)
    };
    let (link, mut events) = DeviceLink::new(opener);
    let link = Arc::new(link);
    let mut temperature = link.temperature();

    let sink: Arc<dyn CommandSink> = Arc::clone(&link) as Arc<dyn CommandSink>;
    let mut console = Console {
        link: Arc::clone(&link),
        control: ControlLampUseCase::new(sink),
        config,
    };

    if console.config.connect_on_start {
        console.connect(None).await;
    }

    println!("{HELP_TEXT}");

    // ── Console loop ──────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Ok(Some(command)) => {
                        if console.dispatch(command).await == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{e}"),
                },
                Ok(None) => {
                    info!("end of input");
                    break;
                }
                Err(e) => {
                    error!("failed to read stdin: {e}");
                    break;
                }
            },
            Some(event) = events.recv() => print_link_event(&event),
            Ok(()) = temperature.changed() => {
                let reading = temperature.borrow_and_update().clone();
                println!("Temperature: {reading}°C");
            }
            _ = &mut ctrl_c => {
                info!("received Ctrl+C; shutting down");
                break;
            }
        }
    }

    if let Some(simulator) = simulator {
        simulator.abort();
    }
    if let Err(e) = link.close().await {
        warn!("error while closing the serial link: {e}");
    }
    info!("lamp console stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
