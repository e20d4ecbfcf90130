use clap::Parser;
use faas_exec::{EngineConfig, TracingMetricsSink};
use faas_exec_server::{create_app, run_server};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// Engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Docker daemon socket
    #[arg(long)]
    docker_socket: Option<PathBuf>,

    /// Parent directory for process sandbox scratch directories
    #[arg(long)]
    scratch_root: Option<PathBuf>,

    /// Memory limit in bytes
    #[arg(long)]
    memory_limit: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(socket) = args.docker_socket {
        config = config.with_docker_socket(socket);
    }
    if let Some(root) = args.scratch_root {
        config = config.with_scratch_root(root);
    }
    if let Some(memory) = args.memory_limit {
        config.policy.memory_bytes = memory;
    }
    config.validate()?;
    info!("Engine configuration: {:?}", config);

    let app = create_app(&config, Arc::new(TracingMetricsSink));
    run_server(app, args.addr).await?;

    Ok(())
}
