use clap::Parser;
use cli::NodeCli;
use common::util::trace::initialize_tracing;
use network::start_node;
use std::process::ExitCode;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenv::dotenv();
    if let Err(err) = initialize_tracing("info") {
        eprintln!("spoolnode: {err:#}");
    }
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    let args = NodeCli::parse();
    info!("spoolnode started");

    match start_node(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("spoolnode: {err:#}");
            ExitCode::FAILURE
        }
    }
}
