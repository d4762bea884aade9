use clap::Parser;

use topology_tester::config::{self, Cli};
use topology_tester::lifecycle::startup;
use topology_tester::observability::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load(Cli::parse())?;
    logging::init(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "topology-tester starting");

    if let Err(e) = startup::run(config).await {
        tracing::error!(error = %e, "Fatal startup error");
        return Err(e.into());
    }
    Ok(())
}
