use anyhow::{Context, Result};
use log::info;
use rocket::fairing::AdHoc;
use std::process::ExitCode;
use std::time::Instant;

use smashpix::api::build_rocket;
use smashpix::bootstrap::setup::initialize_logger;
use smashpix::common::ROCKET_RUNTIME;
use smashpix::common::errors::handle_error;
use smashpix::config::server::ServerConfig;
use smashpix::storage::notification::ResourceState;
use smashpix::workflow::{AppState, notify_object_change};

fn main() -> ExitCode {
    if let Err(error) = initialize_logger(None) {
        eprintln!("Error: {:?}", error);
        return ExitCode::FAILURE;
    }
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            handle_error(error);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let start_time = Instant::now();
    let (config, source) = ServerConfig::load()?;
    source.log();
    if config.auth_key.is_none() {
        info!("No authKey configured; login tokens will not survive a restart");
    }
    let state = AppState::open(config)?;
    let depth = state.store.queue_depth(&state.config.queue_name)?;
    info!(
        duration = &*format!("{:?}", start_time.elapsed());
        "Opened datastore in {:?} ({} queued tasks)",
        state.config.data_dir,
        depth
    );

    let sync_state = state.clone();
    let rocket = build_rocket(state).attach(AdHoc::on_liftoff(
        "Notification channel sync",
        move |_| {
            Box::pin(async move {
                notify_object_change(&sync_state, ResourceState::Sync, None).await;
            })
        },
    ));

    ROCKET_RUNTIME
        .block_on(rocket.launch())
        .map(|_| ())
        .context("Rocket server failed")
}
