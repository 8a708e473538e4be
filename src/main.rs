//! Sandbridge demo driver
//!
//! Relays the local terminal to a command run through the reference local
//! launcher. Useful for poking at the relay engine without a sandbox runtime
//! behind it.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sandbridge::{LocalLauncher, RelayConfig, TerminalRelay, TtyMode};

/// Relay the local terminal to a command
#[derive(Parser, Debug)]
#[command(name = "sandbridge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Command to run
    #[arg(default_value = "/bin/sh")]
    command: String,

    /// Arguments passed to the command
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,

    /// Environment variables (KEY=VALUE), repeatable
    #[arg(short, long)]
    env: Vec<String>,

    /// Terminal forwarding behavior
    #[arg(long, value_enum, default_value_t = TtyArg::Auto)]
    tty: TtyArg,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TtyArg {
    /// Forward only when stdin is a terminal
    Auto,
    /// Always forward
    On,
    /// Never forward
    Off,
}

impl From<TtyArg> for TtyMode {
    fn from(arg: TtyArg) -> Self {
        match arg {
            TtyArg::Auto => TtyMode::Auto,
            TtyArg::On => TtyMode::Force,
            TtyArg::Off => TtyMode::Disabled,
        }
    }
}

fn parse_env(vars: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    vars.iter()
        .map(|var| {
            var.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .with_context(|| {
                    format!("invalid environment variable '{}', expected KEY=VALUE", var)
                })
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("sandbridge v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::new(&args.command)
        .args(args.args.clone())
        .envs(parse_env(&args.env)?)
        .tty_mode(args.tty.into());

    let mut relay = TerminalRelay::new(LocalLauncher::new(), config);
    relay.start().await?;
    relay.wait().await;
    relay.shutdown().await?;

    info!("session finished");
    Ok(())
}
