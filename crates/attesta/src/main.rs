use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use attesta::{build_router, spawn_sweeper, AppState, ServerConfig, ServerError};

/// Attesta: attribute-based signature and disclosure session server
#[derive(Parser, Debug)]
#[command(name = "attesta", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the session server
    Serve {
        /// Bind address, overriding the config file
        #[arg(long)]
        bind: Option<String>,

        /// Port, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate the configuration file and exit
    CheckConfig,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("attesta=debug,attesta_proto=debug,attesta_session=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("attesta=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<ServerConfig, ServerError> {
    match path {
        Some(p) => ServerConfig::load(p),
        None => ServerConfig::load(&PathBuf::from("attesta.toml")),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    match cli.command {
        Commands::Serve { bind, port } => cmd_serve(cli.config.as_ref(), bind, port).await,
        Commands::CheckConfig => cmd_check_config(cli.config.as_ref()),
    }
}

async fn cmd_serve(
    config_path: Option<&PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<(), ServerError> {
    let mut config = load_config(config_path)?;
    if let Some(bind) = bind {
        config.bind = bind;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config.validate()?;

    let state = AppState::from_config(&config)?;
    spawn_sweeper(state.clone());

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(ServerError::Io)?;
    info!(%addr, "session server listening");

    axum::serve(listener, build_router(state))
        .await
        .map_err(ServerError::Io)?;
    Ok(())
}

fn cmd_check_config(config_path: Option<&PathBuf>) -> Result<(), ServerError> {
    let config = load_config(config_path)?;
    config.validate()?;

    println!("Configuration OK.");
    println!("  Bind:            {}:{}", config.bind, config.port);
    println!("  Scheme:          {} attributes", config.scheme.attributes.len());
    println!("  Requestors:      {}", config.requestors.len());
    println!("  Attestors:       {}", config.attestors.len());
    println!("  Session timeout: {}s", config.default_session_timeout_secs);
    Ok(())
}
