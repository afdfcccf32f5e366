//! toolbox-gateway: a declaratively configured tool gateway.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use toolbox_gateway::{cli::Cli, gateway::Gateway, setup_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, &cli.log_format) {
        eprintln!("failed to set up tracing: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        catalog = %cli.catalog.display(),
        "starting toolbox-gateway"
    );

    let gateway = match Gateway::new(&cli).await {
        Ok(g) => g,
        Err(e) => {
            error!("failed to initialize gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("gateway shutdown complete");
    ExitCode::SUCCESS
}
