//! Matecraft CLI
//!
//! - `serve`: HTTP server exposing `POST /auto-assembly`
//! - `plan`: print the mutation plan for one assembly without applying it
//! - `apply`: run the full pipeline once against one assembly

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use matecraft_core::{AutoMate, DocumentPath, ElementPath};
use matecraft_onshape::{OnshapeClient, OnshapeConfig};

mod server;

#[derive(Parser)]
#[command(name = "matecraft")]
#[command(author, version, about = "Matecraft: complete and mirror mate connectors in CAD assemblies")]
struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. `debug` or `matecraft_core=trace`
    #[arg(long, global = true)]
    log: Option<String>,

    /// CAD platform base URL (overrides ONSHAPE_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Per-request timeout in seconds (overrides ONSHAPE_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the auto-assembly HTTP endpoint.
    Serve {
        /// Address to listen on (default 127.0.0.1:$PORT, PORT defaulting to 8080)
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Print the mutation plan as JSON; nothing is changed.
    Plan(AssemblyArgs),
    /// Apply the mutation plan.
    Apply(AssemblyArgs),
}

#[derive(Args)]
struct AssemblyArgs {
    /// OAuth token for the CAD platform
    #[arg(long, env = "ONSHAPE_TOKEN", hide_env_values = true)]
    token: String,

    #[arg(long)]
    document: String,

    #[arg(long, conflicts_with = "version_id", required_unless_present = "version_id")]
    workspace_id: Option<String>,

    #[arg(long)]
    version_id: Option<String>,

    /// Assembly element id
    #[arg(long)]
    element: String,
}

impl AssemblyArgs {
    fn path(&self) -> Result<ElementPath> {
        let document = match (&self.workspace_id, &self.version_id) {
            (Some(w), None) => DocumentPath::workspace(&self.document, w),
            (None, Some(v)) => DocumentPath::version(&self.document, v),
            _ => return Err(anyhow!("pass exactly one of --workspace-id or --version-id")),
        };
        Ok(ElementPath::new(document, &self.element))
    }
}

fn init_tracing(log: Option<&str>) -> Result<()> {
    let filter = match log {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<OnshapeConfig> {
    let mut config = OnshapeConfig::from_env()?;
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url)?;
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_timeout_secs(secs);
    }
    Ok(config)
}

fn listen_addr(flag: Option<SocketAddr>) -> Result<SocketAddr> {
    if let Some(addr) = flag {
        return Ok(addr);
    }
    let port = match env::var("PORT") {
        Ok(p) => p.trim().parse::<u16>().map_err(|e| anyhow!("PORT `{p}`: {e}"))?,
        Err(_) => 8080,
    };
    Ok(SocketAddr::from(([127, 0, 0, 1], port)))
}

fn engine(config: OnshapeConfig, token: &str) -> Result<AutoMate> {
    let client = Arc::new(OnshapeClient::new(config, token)?);
    Ok(AutoMate::new(client.clone(), client))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref())?;
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Serve { listen } => {
            let state = Arc::new(server::ServerState::onshape(config)?);
            server::serve(listen_addr(*listen)?, state).await?;
        }
        Commands::Plan(args) => {
            let assembly = args.path()?;
            let planned = engine(config, &args.token)?.plan(&assembly).await?;
            println!("{}", serde_json::to_string_pretty(&planned.plan)?);
        }
        Commands::Apply(args) => {
            let assembly = args.path()?;
            let report = engine(config, &args.token)?.run(&assembly).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
