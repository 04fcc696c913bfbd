use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use meshchain_config::MeshGatewayMode;

mod commands;

use commands::Coordinates;

#[derive(Parser)]
#[command(
    name = "meshchain",
    about = "meshchain: service discovery chain compiler",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format: text or json
    #[arg(long, global = true, default_value = "text", env = "MESHCHAIN_LOG_FORMAT")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the discovery chain for one service
    Compile {
        /// Entries file (.toml or .json)
        #[arg(short, long)]
        entries: PathBuf,
        /// Service to compile the chain for
        #[arg(short, long)]
        service: String,
        #[command(flatten)]
        coordinates: Coordinates,
        /// Force the chain protocol (tcp, http, http2, grpc)
        #[arg(long)]
        override_protocol: Option<String>,
        /// Force the mesh gateway mode of every target (none, local, remote)
        #[arg(long)]
        override_mesh_gateway: Option<MeshGatewayMode>,
        /// Force the connect timeout of every resolver, e.g. "10s"
        #[arg(long, value_parser = parse_timeout)]
        override_connect_timeout: Option<Duration>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Validate every entry and compile a chain for every service named
    Validate {
        /// Entries file (.toml or .json)
        #[arg(short, long)]
        entries: PathBuf,
        #[command(flatten)]
        coordinates: Coordinates,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Synthesize and compile chains for an API gateway's routes
    Gateway {
        /// Routes file (.toml or .json)
        #[arg(short, long)]
        routes: PathBuf,
        #[command(flatten)]
        coordinates: Coordinates,
        /// Suffix used in synthesized route names
        #[arg(long, default_value = "http")]
        suffix: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    meshchain_config::duration::parse_duration(s).ok_or_else(|| format!("invalid duration {s:?}"))
}

fn init_tracing(log_format: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("meshchain=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match log_format {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_format)?;

    match cli.command {
        Commands::Compile {
            entries,
            service,
            coordinates,
            override_protocol,
            override_mesh_gateway,
            override_connect_timeout,
            format,
        } => commands::compile::compile(
            &entries,
            &service,
            &coordinates,
            commands::compile::Overrides {
                protocol: override_protocol,
                mesh_gateway: override_mesh_gateway,
                connect_timeout: override_connect_timeout,
            },
            &format,
        ),
        Commands::Validate {
            entries,
            coordinates,
            format,
        } => commands::validate::validate(&entries, &coordinates, &format),
        Commands::Gateway {
            routes,
            coordinates,
            suffix,
            format,
        } => commands::gateway::gateway(&routes, &coordinates, &suffix, &format),
    }
}
