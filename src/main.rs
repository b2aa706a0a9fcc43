use formgate::infrastructure::http::{init_tracing, serve};
use formgate::{Config, FormGate};
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let gate = match FormGate::builder().with_config(config).build() {
        Ok(gate) => gate,
        Err(e) => {
            error!(error = %e, "failed to build form gate");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = serve(gate).await {
        error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
