use anyhow::{Context, Result};
use redb::ReadableTable;

use crate::database::Store;
use crate::database::schema::task::{QUEUE_SEQUENCE_TABLE, TASK_TABLE, TaskSchema};

impl Store {
    /// Append a task to `queue` and return its sequence number.
    pub fn enqueue_task(&self, queue: &str, payload: &[u8], now: i64) -> Result<u64> {
        let txn = self.begin_write()?;
        let id = {
            let mut sequence = txn.open_table(QUEUE_SEQUENCE_TABLE)?;
            let id = sequence.get(queue)?.map(|last| last.value()).unwrap_or(0) + 1;
            sequence.insert(queue, id)?;

            let task = TaskSchema {
                payload: payload.to_vec(),
                enqueue_timestamp: now,
                lease_expires: 0,
                retry_count: 0,
            };
            let mut tasks = txn.open_table(TASK_TABLE)?;
            let encoded = bitcode::encode(&task);
            tasks.insert((queue, id), encoded.as_slice())?;
            id
        };
        txn.commit()
            .with_context(|| format!("failed to enqueue task into {queue}"))?;
        Ok(id)
    }

    /// Lease up to `num_tasks` tasks whose lease is free, oldest first.
    pub fn lease_tasks(
        &self,
        queue: &str,
        num_tasks: usize,
        lease_secs: u64,
        now: i64,
    ) -> Result<Vec<(u64, TaskSchema)>> {
        if num_tasks == 0 {
            return Ok(Vec::new());
        }
        let lease_until = now.saturating_add((lease_secs as i64).saturating_mul(1000));
        let txn = self.begin_write()?;
        let leased = {
            let mut tasks = txn.open_table(TASK_TABLE)?;
            let mut available = Vec::with_capacity(num_tasks);
            for entry in tasks.range((queue, 0u64)..=(queue, u64::MAX))? {
                let (key, value) = entry?;
                let task: TaskSchema = bitcode::decode(value.value())?;
                if task.lease_expires <= now {
                    available.push((key.value().1, task));
                    if available.len() == num_tasks {
                        break;
                    }
                }
            }

            for (id, task) in available.iter_mut() {
                task.lease_expires = lease_until;
                task.retry_count += 1;
                let encoded = bitcode::encode(&*task);
                tasks.insert((queue, *id), encoded.as_slice())?;
            }
            available
        };
        txn.commit()?;
        Ok(leased)
    }

    /// Returns whether the task existed.
    pub fn delete_task(&self, queue: &str, id: u64) -> Result<bool> {
        let txn = self.begin_write()?;
        let existed = {
            let mut tasks = txn.open_table(TASK_TABLE)?;
            let existed = tasks.remove((queue, id))?.is_some();
            existed
        };
        txn.commit()?;
        Ok(existed)
    }

    pub fn queue_depth(&self, queue: &str) -> Result<usize> {
        let txn = self.begin_read()?;
        let tasks = txn.open_table(TASK_TABLE)?;
        let mut depth = 0;
        for entry in tasks.range((queue, 0u64)..=(queue, u64::MAX))? {
            entry?;
            depth += 1;
        }
        Ok(depth)
    }
}
