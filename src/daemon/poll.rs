use log::{debug, error, info};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::daemon::DaemonConfig;
use crate::daemon::client::{CloudServices, LeaseError};
use crate::daemon::stats::Stats;
use crate::daemon::task::{TaskStatus, run_task};
use crate::imaging::Bitifier;

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Pass,
    Fail,
    NoTasks,
    RateLimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPolicy {
    pub after_tasks: Duration,
    pub after_no_tasks: Duration,
    pub rate_limited: Duration,
}

impl SleepPolicy {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            after_tasks: config.sleep_after_tasks(),
            after_no_tasks: config.sleep_after_no_tasks(),
            rate_limited: config.sleep_rate_limit(),
        }
    }

    /// Failures wait as long as an empty queue.
    pub fn sleep_for(&self, outcome: BatchOutcome) -> Duration {
        match outcome {
            BatchOutcome::Pass => self.after_tasks,
            BatchOutcome::NoTasks | BatchOutcome::Fail => self.after_no_tasks,
            BatchOutcome::RateLimited => self.rate_limited,
        }
    }
}

pub struct Poller {
    cloud: Arc<dyn CloudServices>,
    bitifier: Arc<Bitifier>,
    stats: Arc<Stats>,
    sleep: SleepPolicy,
}

impl Poller {
    pub fn new(
        cloud: Arc<dyn CloudServices>,
        bitifier: Arc<Bitifier>,
        stats: Arc<Stats>,
        sleep: SleepPolicy,
    ) -> Self {
        Self {
            cloud,
            bitifier,
            stats,
            sleep,
        }
    }

    /// Lease a batch, process every task on its own thread, then delete them all.
    pub fn do_task_batch(&self) -> BatchOutcome {
        let tasks = match self.cloud.lease_tasks() {
            Ok(tasks) => tasks,
            Err(LeaseError::RateLimited) => {
                error!("Lease refused: rate limit exceeded");
                return BatchOutcome::RateLimited;
            }
            Err(LeaseError::Failed(err)) => {
                error!("Task batch failed: {:#}", err);
                return BatchOutcome::Fail;
            }
        };
        if tasks.is_empty() {
            debug!("No tasks in queue.");
            return BatchOutcome::NoTasks;
        }
        self.stats.record_leased(tasks.len());
        info!("Received {} tasks.", tasks.len());

        let mut outcome = BatchOutcome::Pass;
        let handles: Vec<_> = tasks
            .iter()
            .map(|task| {
                let cloud = Arc::clone(&self.cloud);
                let bitifier = Arc::clone(&self.bitifier);
                let task = task.clone();
                thread::Builder::new()
                    .name(format!("task-{}", task.id))
                    .spawn(move || run_task(cloud.as_ref(), &bitifier, &task))
            })
            .collect();

        for handle in handles {
            let status = match handle {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    error!("Task thread panicked");
                    TaskStatus::Fail
                }),
                Err(err) => {
                    error!("Could not start task thread: {}", err);
                    TaskStatus::Fail
                }
            };
            if status == TaskStatus::Fail {
                outcome = BatchOutcome::Fail;
            }
        }

        for task in &tasks {
            match self.cloud.delete_task(task) {
                Ok(()) => {
                    self.stats.record_deleted();
                    debug!("Deleted task {}.", task.id);
                }
                Err(err) => {
                    error!("{:#}", err);
                    outcome = BatchOutcome::Fail;
                }
            }
            self.stats.record_completed();
        }
        outcome
    }

    /// Poll until `shutdown` fires or its sender goes away.
    pub fn run(&self, shutdown: Receiver<()>) {
        let mut minute_start = Instant::now();
        loop {
            if minute_start.elapsed() >= MINUTE {
                let completed = self.stats.roll_minute();
                info!("Number of tasks completed in last minute: {}", completed);
                minute_start = Instant::now();
            }

            let outcome = self.do_task_batch();
            let pause = self.sleep.sleep_for(outcome);
            debug!("{:?}: sleeping for {:?}", outcome, pause);
            match shutdown.recv_timeout(pause) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("Shutting down poll loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::task::tests::{FakeCloud, leased, plain_bitifier, small_png};
    use std::sync::mpsc;

    fn policy() -> SleepPolicy {
        SleepPolicy {
            after_tasks: Duration::from_millis(1),
            after_no_tasks: Duration::from_millis(4),
            rate_limited: Duration::from_millis(10),
        }
    }

    fn poller(cloud: Arc<FakeCloud>) -> (Poller, Arc<Stats>) {
        let stats = Arc::new(Stats::default());
        let poller = Poller::new(cloud, Arc::new(plain_bitifier()), stats.clone(), policy());
        (poller, stats)
    }

    #[test]
    fn sleep_depends_on_outcome() {
        let policy = policy();
        assert_eq!(policy.sleep_for(BatchOutcome::Pass), Duration::from_millis(1));
        assert_eq!(policy.sleep_for(BatchOutcome::NoTasks), Duration::from_millis(4));
        assert_eq!(policy.sleep_for(BatchOutcome::Fail), Duration::from_millis(4));
        assert_eq!(policy.sleep_for(BatchOutcome::RateLimited), Duration::from_millis(10));
    }

    #[test]
    fn batch_processes_and_deletes_every_task() {
        let cloud = Arc::new(
            FakeCloud::default()
                .with_image("http://app/a", small_png())
                .with_image("http://app/b", small_png()),
        );
        cloud.leases.lock().unwrap().push_back(Ok(vec![
            leased(1, "k1", "http://app/a"),
            leased(2, "k2", "http://app/b"),
        ]));
        let (poller, stats) = poller(cloud.clone());

        assert_eq!(poller.do_task_batch(), BatchOutcome::Pass);
        let mut deleted = cloud.deleted.lock().unwrap().clone();
        deleted.sort();
        assert_eq!(deleted, ["1", "2"]);
        assert_eq!(cloud.updates.lock().unwrap().len(), 2);
        assert_eq!(stats.snapshot().num_tasks_processing, 0);
        assert_eq!(stats.roll_minute(), 2);
    }

    #[test]
    fn failed_task_fails_the_batch_but_is_deleted() {
        let cloud = Arc::new(FakeCloud {
            reject_updates: true,
            ..FakeCloud::default()
        });
        cloud
            .leases
            .lock()
            .unwrap()
            .push_back(Ok(vec![leased(7, "k7", "http://app/none")]));
        let (poller, _stats) = poller(cloud.clone());
        assert_eq!(poller.do_task_batch(), BatchOutcome::Fail);
        assert_eq!(*cloud.deleted.lock().unwrap(), ["7"]);
    }

    #[test]
    fn lease_errors_map_to_outcomes() {
        let cloud = Arc::new(FakeCloud::default());
        {
            let mut leases = cloud.leases.lock().unwrap();
            leases.push_back(Err(LeaseError::RateLimited));
            leases.push_back(Err(LeaseError::Failed(anyhow::anyhow!("socket error"))));
        }
        let (poller, stats) = poller(cloud);
        assert_eq!(poller.do_task_batch(), BatchOutcome::RateLimited);
        assert_eq!(poller.do_task_batch(), BatchOutcome::Fail);
        assert_eq!(poller.do_task_batch(), BatchOutcome::NoTasks);
        assert_eq!(stats.snapshot().last_leased_date, None);
    }

    #[test]
    fn run_stops_on_shutdown() {
        let cloud = Arc::new(FakeCloud::default());
        let (poller, _stats) = poller(cloud);
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || poller.run(receiver));
        sender.send(()).unwrap();
        handle.join().unwrap();
    }
}
