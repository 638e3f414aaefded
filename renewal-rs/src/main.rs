use std::path::PathBuf;
use std::process::ExitCode;

use mrp::Environment;
use renewal::{
    parameters::Parameters,
    run::{RunError, run_forecast},
};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Run document from the path given as first argument, otherwise from stdin
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let result = Environment::<Parameters>::load(path.as_deref())
        .map_err(RunError::from)
        .and_then(|ctx| run_forecast(&ctx));

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
