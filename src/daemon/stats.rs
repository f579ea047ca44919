use chrono::Local;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::common::DATETIME_STRSAFE;

/// Counters exposed by the heartbeat endpoint.
#[derive(Debug, Default)]
pub struct Stats {
    processing: AtomicUsize,
    processed_last_min: AtomicUsize,
    // Completed since the current minute started.
    completed: AtomicUsize,
    last_leased_date: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub num_tasks_processing: usize,
    pub num_tasks_processed_last_min: usize,
    pub last_leased_date: Option<String>,
}

impl Stats {
    pub fn record_leased(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.processing.fetch_add(count, Ordering::SeqCst);
        let now = Local::now().format(DATETIME_STRSAFE).to_string();
        *self
            .last_leased_date
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(now);
    }

    /// One leased task left the queue. Never drops below zero.
    pub fn record_deleted(&self) {
        let _ = self
            .processing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(1))
            });
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Publish the tasks completed in the minute that just ended and start a new one.
    pub fn roll_minute(&self) -> usize {
        let completed = self.completed.swap(0, Ordering::SeqCst);
        self.processed_last_min.store(completed, Ordering::SeqCst);
        completed
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            num_tasks_processing: self.processing.load(Ordering::SeqCst),
            num_tasks_processed_last_min: self.processed_last_min.load(Ordering::SeqCst),
            last_leased_date: self
                .last_leased_date
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
