//! Aether Conductor command-line interface.
//!
//! `conductor run` wraps the configured worker in the authorization loop
//! and exits with the worker's exit code. `status` and `history` talk to a
//! running conductor over its gateway socket; `audit` tails the NDJSON
//! audit log directly.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use conductor_browser::NullPlane;
use conductor_core::{conductor::default_messengers, AuditReader, Conductor};
use conductor_types::{config::expand_home, ConductorConfig, CONFIG_FILENAME};

/// Aether Conductor -- authorization mediator for wrapped coding agents.
#[derive(Parser, Debug)]
#[command(name = "conductor", version, about)]
struct Cli {
    /// Increase logging verbosity (RUST_LOG=debug)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Path to conductor.toml (defaults to ./conductor.toml, then
    /// ~/.openclaw/conductor.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wrap the worker in the authorization loop (the default)
    Run {
        /// Override the configured worker command and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Show pending requests and counters from a running conductor
    Status,

    /// Show recent resolved requests from a running conductor
    History {
        /// Number of entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show recent audit log entries
    Audit {
        /// Number of entries to show
        #[arg(long, default_value = "20")]
        last: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("conductor: {e:#}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run { command: vec![] }) {
        Commands::Run { command } => run_loop(config, command),
        Commands::Status => {
            let status = rpc_call(&config, "conductor.status", serde_json::json!({}))?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(0)
        }
        Commands::History { limit } => {
            let history = rpc_call(
                &config,
                "conductor.history",
                serde_json::json!({ "limit": limit }),
            )?;
            println!("{}", serde_json::to_string_pretty(&history)?);
            Ok(0)
        }
        Commands::Audit { last } => {
            let reader = AuditReader::open(config.audit_path())
                .with_context(|| format!("open {}", config.audit_path().display()))?;
            for line in reader.tail(last) {
                println!("{line}");
            }
            Ok(0)
        }
    }
}

fn run_loop(mut config: ConductorConfig, command_override: Vec<String>) -> anyhow::Result<i32> {
    if let Some((command, args)) = command_override.split_first() {
        config.wrapped_command = command.clone();
        config.wrapped_args = args.to_vec();
    }
    // Invoking `conductor run` is the opt-in; the config flag gates hosts
    // that embed the loop alongside other features.
    config.enabled = true;

    let messengers = default_messengers(&config);
    let code = Conductor::run(config, Box::new(NullPlane), messengers)?;
    Ok(code)
}

/// Load configuration: an explicit path must exist; otherwise the first of
/// `./conductor.toml` and `~/.openclaw/conductor.toml` that exists, falling
/// back to defaults.
fn load_config(explicit: Option<&std::path::Path>) -> anyhow::Result<ConductorConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            Some(path.to_path_buf())
        }
        None => [
            PathBuf::from(CONFIG_FILENAME),
            expand_home(std::path::Path::new("~/.openclaw/conductor.toml")),
        ]
        .into_iter()
        .find(|p| p.exists()),
    };

    match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?;
            ConductorConfig::from_toml(&content)
                .with_context(|| format!("parse {}", path.display()))
                .map_err(Into::into)
        }
        None => Ok(ConductorConfig::default()),
    }
}

/// One blocking RPC round-trip against a running conductor's gateway.
fn rpc_call(
    config: &ConductorConfig,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let socket_path = config.gateway_socket_path();
    let mut stream = UnixStream::connect(&socket_path).with_context(|| {
        format!(
            "connect to {} (is a conductor running?)",
            socket_path.display()
        )
    })?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;

    let request = serde_json::json!({ "id": 1, "method": method, "params": params });
    let mut line = request.to_string();
    line.push('\n');
    stream.write_all(line.as_bytes())?;

    // Skip event pushes until our response arrives.
    let mut reader = BufReader::new(stream);
    for _ in 0..50 {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            bail!("gateway closed the connection");
        }
        let value: serde_json::Value = serde_json::from_str(line.trim())?;
        if value.get("id").and_then(|i| i.as_u64()) != Some(1) {
            continue;
        }
        if value["ok"] == true {
            return Ok(value["data"].clone());
        }
        bail!("gateway error: {}", value["error"].as_str().unwrap_or("unknown"));
    }
    bail!("no response from gateway")
}

fn init_tracing(cli: &Cli) {
    let default = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
