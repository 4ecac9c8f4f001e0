use std::process::ExitCode;
use tracing::error;

use stay_worker::{shutdown_signal, telemetry, LogFormat, WorkerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    telemetry::init_tracing(LogFormat::from_env());

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid worker configuration");
            return ExitCode::FAILURE;
        }
    };

    match stay_worker::run(config, shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Worker exited with failure");
            ExitCode::FAILURE
        }
    }
}
