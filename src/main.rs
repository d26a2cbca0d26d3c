//! arbscan entry point
//!
//! Exit codes: 0 on a clean shutdown, 2 on a fatal configuration or
//! startup fault, 3 when every venue stayed silent past the loss window.

use std::process::ExitCode;

use arbscan::infrastructure::logging::init_logging;
use arbscan::{App, Config, ExitOutcome};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let _guards = init_logging(&config.log_level);

    match App::new(config).run().await {
        Ok(ExitOutcome::Clean) => ExitCode::SUCCESS,
        Ok(ExitOutcome::AllVenuesLost) => ExitCode::from(3),
        Err(e) => {
            tracing::error!("fatal: {}", e);
            ExitCode::from(2)
        }
    }
}
