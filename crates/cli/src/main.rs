mod config;
mod serve;
mod simulate;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "APPROVALS_LOG";

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// How the approver decides in a simulated case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Decision {
    Approve,
    Reject,
}

/// Two-step approval workflow service.
#[derive(Parser)]
#[command(name = "approvals", version, about = "Two-step approval workflow service")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the approval workflow HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// TOML file overriding the flags above
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run one case through its lifecycle in process and print its status
    Simulate {
        /// Approver decision
        #[arg(long, default_value = "approve", value_enum)]
        decision: Decision,
        #[arg(long, default_value = "initiator-1")]
        initiator: String,
        #[arg(long, default_value = "approver-1")]
        approver: String,
        #[arg(long, default_value = "executor-1")]
        executor: String,
        /// Case payload as a JSON object
        #[arg(long)]
        payload: Option<String>,
        /// Comment attached to every action
        #[arg(long)]
        comment: Option<String>,
    },
}

fn init_tracing(quiet: bool) {
    let default = if quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(default.into())
                .with_env_var(LOG_ENV)
                .from_env_lossy(),
        )
        .try_init();
}

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Commands::Serve { port, host, config } => {
            let serve_config = match config::load(&config::CliConfig { host, port }, config) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("error: {}", e);
                    process::exit(1);
                }
            };
            if let Err(e) = runtime().block_on(serve::start_server(serve_config)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
        Commands::Simulate {
            decision,
            initiator,
            approver,
            executor,
            payload,
            comment,
        } => {
            let options = simulate::SimulateOptions {
                decision,
                initiator,
                approver,
                executor,
                payload,
                comment,
            };
            if let Err(e) = runtime().block_on(simulate::cmd_simulate(options, cli.output)) {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
    }
}
