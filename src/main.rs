//! weeclient CLI - headless WeeChat relay client.
//!
//! Connects, authenticates, runs the startup queries and prints events to
//! stdout. Lines typed on stdin are sent as chat input. See the `weeclient`
//! library for the core functionality.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use weeclient::{transport, Buffer, Command, Config, Event, Line, Session, TransportKind};

// CLI
#[derive(Parser, Debug)]
#[command(name = "weeclient")]
#[command(version)]
#[command(about = "Headless client for the WeeChat relay protocol")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Relay address (host[:port])
    #[arg(long, global = true)]
    relay: Option<String>,

    /// Connect over WebSocket instead of raw TCP
    #[arg(long, global = true)]
    websocket: bool,

    /// WebSocket endpoint path
    #[arg(long, global = true)]
    path: Option<String>,

    /// Use TLS for the WebSocket connection
    #[arg(long, global = true)]
    tls: bool,

    /// History lines to fetch per buffer
    #[arg(long, global = true)]
    lines: Option<u32>,

    /// Log every decoded message (needs RUST_LOG=trace)
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Connect and stream events (default)
    Connect,
    /// Print the effective configuration
    Config {
        /// Write it to the default config file
        #[arg(long)]
        save: bool,
    },
}

impl Cli {
    /// Command-line flags win over the file and the environment.
    fn apply(&self, config: &mut Config) {
        if let Some(relay) = &self.relay {
            config.relay.clone_from(relay);
        }
        if self.websocket {
            config.transport = TransportKind::WebSocket;
        }
        if let Some(path) = &self.path {
            config.websocket_path.clone_from(path);
        }
        if self.tls {
            config.tls = true;
        }
        if let Some(lines) = self.lines {
            config.history_lines = lines;
        }
        if self.trace {
            config.trace_protocol = true;
        }
    }
}

/// What a line typed on stdin asks for.
#[derive(Debug, PartialEq, Eq)]
enum InputAction {
    Send(Command),
    Quit,
    Ignore,
}

/// Parse one stdin line.
///
/// - `/nicks <buffer>` requests a nicklist
/// - `/quit` ends the session
/// - `<buffer> <text>` sends chat input
fn parse_input(line: &str) -> InputAction {
    let line = line.trim();
    if line.is_empty() {
        return InputAction::Ignore;
    }
    if line == "/quit" {
        return InputAction::Quit;
    }
    if let Some(buffer) = line.strip_prefix("/nicks") {
        return InputAction::Send(Command::Nicklist {
            buffer: buffer.trim().to_string(),
        });
    }
    match line.split_once(' ') {
        Some((buffer, text)) if !text.trim().is_empty() => InputAction::Send(Command::Input {
            buffer: buffer.to_string(),
            text: text.to_string(),
        }),
        _ => {
            eprintln!("usage: <buffer> <text> | /nicks <buffer> | /quit");
            InputAction::Ignore
        }
    }
}

/// Buffers seen so far, for naming lines.
#[derive(Debug, Default)]
struct Buffers {
    by_identity: HashMap<String, Buffer>,
}

impl Buffers {
    fn merge(&mut self, buffers: HashMap<String, Buffer>) {
        let mut sorted: Vec<_> = buffers.values().collect();
        sorted.sort_by_key(|b| b.number);
        for buffer in sorted {
            println!("#{:<3} {}  {}", buffer.number, buffer.full_name, buffer.title);
        }
        self.by_identity.extend(buffers);
    }

    fn print_line(&mut self, line: Line) {
        let name = self
            .by_identity
            .get(&line.buffer)
            .map_or(line.buffer.as_str(), |b| b.display_name());
        println!(
            "{} {} {} {}",
            line.timestamp.format("%H:%M:%S"),
            name,
            line.prefix,
            line.message
        );
        if let Some(buffer) = self.by_identity.get_mut(&line.buffer) {
            buffer.push_line(line);
        }
    }

    fn name<'a>(&'a self, identity: &'a str) -> &'a str {
        self.by_identity
            .get(identity)
            .map_or(identity, |b| b.full_name.as_str())
    }
}

/// Connect and stream events until the relay closes or the user quits.
async fn run(config: Config) -> Result<()> {
    if config.password.is_empty() {
        log::warn!("No relay password set (WEECLIENT_PASSWORD); the relay may reject init");
    }

    let transport = transport::build(&config);
    let session = Session::start(transport, &config.session_config())
        .await
        .with_context(|| format!("Could not connect to relay at {}", config.relay))?;
    println!("Connected to {} over {}", config.relay, config.transport);

    let (handle, mut events) = session.into_parts();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut buffers = Buffers::default();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    Event::Buffers(found) => buffers.merge(found),
                    Event::Line(line) => buffers.print_line(line),
                    Event::Nicks { buffer, nicks } => {
                        let names: Vec<String> =
                            nicks.iter().map(|n| format!("{}{}", n.prefix, n.name)).collect();
                        println!("{}: {}", buffers.name(&buffer), names.join(" "));
                    }
                    Event::Unhandled(message) => {
                        log::debug!(
                            "Unhandled message {:?} ({})",
                            message.identifier,
                            message.object_type()
                        );
                    }
                    Event::DecodeError(e) => eprintln!("! dropped frame: {e}"),
                    Event::DispatchError(e) => eprintln!("! dropped message: {e}"),
                    Event::ConnectionLost { reason } => {
                        eprintln!("Connection lost: {reason}");
                        break;
                    }
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match parse_input(&line) {
                        InputAction::Send(command) => handle.send(command)?,
                        InputAction::Quit => {
                            handle.send(Command::Quit)?;
                            break;
                        }
                        InputAction::Ignore => {}
                    },
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        log::warn!("stdin closed: {e}");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, sending quit");
                if let Err(e) = handle.send(Command::Quit) {
                    log::debug!("Quit not queued: {e}");
                }
                break;
            }
        }
    }

    println!("Shutting down...");
    handle.shutdown().await;
    Ok(())
}

/// Set up logging: stderr by default, or the file named by
/// `WEECLIENT_LOG_FILE` so log output does not interleave with events.
fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Ok(path) = std::env::var("WEECLIENT_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.format_timestamp_secs().init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env_overrides();
            config
        }
        None => Config::load()?,
    };
    cli.apply(&mut config);

    match cli.command.unwrap_or(Commands::Connect) {
        Commands::Connect => run(config).await?,
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                config.save()?;
                println!("Saved to {}", Config::default_path()?.display());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "weeclient",
            "--relay",
            "chat.example:9443",
            "--websocket",
            "--tls",
            "--lines",
            "100",
        ])
        .unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.relay, "chat.example:9443");
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert!(config.tls);
        assert_eq!(config.history_lines, 100);
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_config_subcommand() {
        let cli = Cli::try_parse_from(["weeclient", "config", "--save"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Config { save: true }));
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(
            parse_input("irc.libera.#rust hello there"),
            InputAction::Send(Command::Input {
                buffer: "irc.libera.#rust".into(),
                text: "hello there".into(),
            })
        );
        assert_eq!(
            parse_input("/nicks irc.libera.#rust"),
            InputAction::Send(Command::Nicklist {
                buffer: "irc.libera.#rust".into(),
            })
        );
        assert_eq!(parse_input("/quit"), InputAction::Quit);
        assert_eq!(parse_input("   "), InputAction::Ignore);
        assert_eq!(parse_input("lonely"), InputAction::Ignore);
    }
}
