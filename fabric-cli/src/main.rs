//! Entry point for the `fabric` binary.

use std::process::ExitCode;

use clap::Parser;
use fabric_cli::config::load_env_files;
use fabric_cli::{logging, App, Arguments, FabricPaths};

#[tokio::main]
async fn main() -> ExitCode {
    let paths = match FabricPaths::discover() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("fabric: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    // Must happen before parsing so `.env` values feed clap's `env` fallbacks.
    load_env_files(&paths);
    let args = Arguments::parse();

    if let Err(e) = logging::init(&args.log_level) {
        eprintln!("fabric: {e}");
        return ExitCode::from(e.exit_code());
    }

    let app = App::new(paths, &args);
    let mut input = std::io::stdin().lock();
    let mut out = std::io::stdout().lock();

    match app.run(&args, &mut input, &mut out).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("fabric: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
