use clap::Parser;
use tracing::{error, info};

use imagegen_mcp::{
    api::shutdown_signal, config::Config, init_logging, observability::log_config_info, startup,
    Result, APP_NAME, VERSION,
};

/// MCP server for image generation
#[derive(Debug, Parser)]
#[command(name = "imagegen-mcp", version, about)]
struct Cli {
    /// Bind address (overrides IMAGEGEN_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides IMAGEGEN_PORT)
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists; must happen before configuration is read
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate_all()?;

    init_logging(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting image generation MCP server");
    log_config_info(&config);

    if let Err(e) = startup::run(config, shutdown_signal()).await {
        error!(error = %e, "Server terminated with error");
        return Err(e);
    }

    info!("Shutdown complete");
    Ok(())
}
