use log::{error, info};
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State, get};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use crate::common::HEARTBEAT_RUNTIME;
use crate::config::daemon::DaemonConfig;
use crate::daemon::stats::{Stats, StatsSnapshot};

#[get("/")]
pub fn heartbeat(stats: &State<Arc<Stats>>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}

pub fn build_heartbeat(stats: Arc<Stats>, config: &DaemonConfig) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", config.heartbeat_address.clone()))
        .merge(("port", config.heartbeat_port))
        .merge(("ident", "smashpix-daemon"))
        .merge(("shutdown.ctrlc", false));
    rocket::custom(figment)
        .manage(stats)
        .mount("/", routes![heartbeat])
}

/// Serve the heartbeat and turn Ctrl-C into a message on `shutdown`.
pub fn spawn_heartbeat(
    stats: Arc<Stats>,
    config: &DaemonConfig,
    shutdown: Sender<()>,
) -> JoinHandle<()> {
    let rocket = build_heartbeat(stats, config);
    thread::spawn(move || {
        HEARTBEAT_RUNTIME.block_on(async move {
            HEARTBEAT_RUNTIME.spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received");
                    let _ = shutdown.send(());
                }
            });
            // The daemon keeps polling even when the heartbeat cannot bind.
            if let Err(err) = rocket.launch().await {
                error!("Could not start up heartbeat server: {}", err);
            }
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Status;
    use rocket::local::blocking::Client;

    #[test]
    fn heartbeat_reports_counters() {
        let stats = Arc::new(Stats::default());
        stats.record_leased(3);
        stats.record_deleted();
        let client = Client::tracked(build_heartbeat(stats, &DaemonConfig::default())).unwrap();

        let response = client.get("/").dispatch();
        assert_eq!(response.status(), Status::Ok);
        let body: serde_json::Value = response.into_json().unwrap();
        assert_eq!(body["numTasksProcessing"], 2);
        assert_eq!(body["numTasksProcessedLastMin"], 0);
        assert!(body["lastLeasedDate"].is_string());
    }
}
