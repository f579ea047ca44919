use anyhow::Result;
use log::info;
use std::process::ExitCode;

use smashpix::bootstrap::setup::initialize_logger;
use smashpix::common::errors::handle_error;
use smashpix::config::daemon::DaemonConfig;

fn main() -> ExitCode {
    // The log file is named in the settings, so they load before the logger.
    let (config, source) = match DaemonConfig::load() {
        Ok(loaded) => loaded,
        Err(error) => {
            eprintln!("Error: {:?}", error);
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = initialize_logger(config.log_filename.as_deref()) {
        eprintln!("Error: {:?}", error);
        return ExitCode::FAILURE;
    }
    source.log();
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            handle_error(error);
            ExitCode::FAILURE
        }
    }
}

fn run(config: DaemonConfig) -> Result<()> {
    info!("Starting task queue reader for {}", config.app_base());
    smashpix::daemon::run(config)
}
