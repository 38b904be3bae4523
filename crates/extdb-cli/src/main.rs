//! extdb-cli — a REPL test harness for the extdb dispatcher.
//!
//! The Rust equivalent of the original extension's `#ifdef TEST_APP`
//! `main()`: reads lines of wire-ABI text from stdin and prints the
//! dispatcher's reply, so a protocol or config change can be poked at from
//! a terminal without a real game server attached. Structured the way
//! `warpd`'s binary is (`clap::Parser`/`Subcommand`, `tracing_subscriber`
//! initialized from an env filter), scaled down to the one subcommand this
//! tool needs.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use extdb_core::ExtConfig;
use extdb_host::Extension;
use tracing::info;

#[derive(Parser)]
#[command(name = "extdb-cli", about = "extdb REPL test harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive REPL against a config file. Type `quit` to
    /// exit.
    Repl {
        /// Path to the `extdb-conf.toml` document.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output buffer size passed to the dispatcher on every line,
        /// mirroring the host's fixed-size reply buffer.
        #[arg(long, default_value = "80")]
        out_size: usize,
    },

    /// Evaluate a single wire-ABI command and print the reply.
    Eval {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "80")]
        out_size: usize,

        /// The raw wire-ABI input string, e.g. `9:VERSION`.
        input: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,extdb_host=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Repl { config, out_size } => run_repl(config, out_size),
        Command::Eval {
            config,
            out_size,
            input,
        } => run_eval(config, out_size, &input),
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ExtConfig> {
    match path {
        Some(path) => Ok(ExtConfig::from_file(&path)?),
        None => Ok(ExtConfig::default()),
    }
}

fn run_eval(config: Option<PathBuf>, out_size: usize, input: &str) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let extension = Extension::start(config)?;
    println!("{}", extension.call(out_size, input));
    extension.stop();
    Ok(())
}

fn run_repl(config: Option<PathBuf>, out_size: usize) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let extension = Extension::start(config)?;
    info!("extdb-cli REPL starting");

    println!("Welcome to the extdb test application.");
    println!("Type wire-ABI commands, e.g. 9:VERSION. Type 'quit' to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("extdb> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "quit" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let reply = extension.call(out_size, line);
        println!("extdb: {reply}");
    }

    println!("extdb-cli: quitting, please wait");
    extension.stop();
    Ok(())
}
