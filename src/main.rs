mod app;
mod cli;
mod constants;
mod conversation;
mod error;
mod logging;
mod modes;
mod ollama;
mod orchestrator;
mod output;
mod prompt;
mod provider;
mod tools;

use anyhow::Result;

use crate::app::run_app;
use crate::cli::Config;
use crate::logging::{init_logging, log_error};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args()?;
    let _telemetry = init_logging(config.otlp_endpoint.as_deref())?;

    if let Err(e) = run_app(config).await {
        log_error(&format!("{:#}", e));
        return Err(e);
    }

    Ok(())
}
