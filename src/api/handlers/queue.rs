use anyhow::anyhow;
use log::{info, warn};
use rocket::form::FromForm;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Responder, Route, State, delete, post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::fairings::guards::service::GuardService;
use crate::api::{AppError, AppResult, GuardResult};
use crate::database::schema::task::TaskList;
use crate::utils::now_millis;
use crate::workflow::AppState;

pub fn generate_queue_routes() -> Vec<Route> {
    routes![lease_tasks, delete_task]
}

#[derive(Debug, FromForm)]
pub struct LeaseParams {
    #[field(name = "numTasks", default = 1)]
    num_tasks: usize,
    #[field(name = "leaseSecs", default = 60)]
    lease_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueErrorDetail {
    pub code: u16,
    pub message: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueErrorBody {
    pub error: QueueErrorDetail,
}

impl QueueErrorBody {
    pub fn rate_limited() -> Self {
        Self {
            error: QueueErrorDetail {
                code: 403,
                message: "Rate Limit Exceeded".to_string(),
                reason: "rateLimitExceeded".to_string(),
            },
        }
    }
}

#[derive(Responder)]
pub enum LeaseResponse {
    Leased(Json<TaskList>),
    #[response(status = 403)]
    RateLimited(Json<QueueErrorBody>),
}

#[post("/<queue>/lease?<params..>")]
pub async fn lease_tasks(
    state: &State<Arc<AppState>>,
    auth: GuardResult<GuardService>,
    queue: &str,
    params: LeaseParams,
) -> AppResult<LeaseResponse> {
    let _ = auth?;
    let now = now_millis();
    if !state.lease_limiter.try_acquire(queue, now) {
        warn!("Lease rate limit hit on queue {}", queue);
        return Ok(LeaseResponse::RateLimited(Json(QueueErrorBody::rate_limited())));
    }

    let store = state.store.clone();
    let queue_name = queue.to_string();
    let leased = tokio::task::spawn_blocking(move || {
        store.lease_tasks(&queue_name, params.num_tasks, params.lease_secs, now)
    })
    .await??;
    if !leased.is_empty() {
        info!("Leased {} tasks from {}", leased.len(), queue);
    }
    Ok(LeaseResponse::Leased(Json(TaskList {
        kind: "taskqueues#tasks".to_string(),
        items: leased
            .iter()
            .map(|(id, task)| task.to_leased(queue, *id))
            .collect(),
    })))
}

#[delete("/<queue>/tasks/<id>")]
pub async fn delete_task(
    state: &State<Arc<AppState>>,
    auth: GuardResult<GuardService>,
    queue: &str,
    id: u64,
) -> AppResult<Status> {
    let _ = auth?;
    let store = state.store.clone();
    let queue_name = queue.to_string();
    let removed = tokio::task::spawn_blocking(move || store.delete_task(&queue_name, id)).await??;
    if removed {
        Ok(Status::NoContent)
    } else {
        Err(AppError::new(
            Status::NotFound,
            anyhow!("Task {id} not found in {queue}"),
        ))
    }
}
