use anyhow::{Context, Result};
use chrono::Local;
use log::{error, info};
use std::time::Instant;

use crate::daemon::client::{CloudServices, TaskUpdate};
use crate::database::schema::task::LeasedTask;
use crate::imaging::Bitifier;
use crate::utils::{last_url_segment, timestamped_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pass,
    Fail,
}

/// Download, bitify and upload one task's image. Returns the processed object name.
pub fn process_task(
    cloud: &dyn CloudServices,
    bitifier: &Bitifier,
    task: &LeasedTask,
) -> Result<String> {
    let payload = task.payload()?;
    let url = payload.image_link.as_str();
    let name = timestamped_name(last_url_segment(url), Local::now());

    let original = cloud.fetch_image(url)?;
    let png = bitifier
        .bitify_bytes(&original)
        .with_context(|| format!("Error processing image for {url}"))?;
    cloud.upload_processed(&name, png)?;
    info!("Successfully created {:?}", name);
    Ok(name)
}

/// Process a task and report the result to the web app.
pub fn run_task(cloud: &dyn CloudServices, bitifier: &Bitifier, task: &LeasedTask) -> TaskStatus {
    let key = match task.payload() {
        Ok(payload) => payload.key,
        Err(err) => {
            error!("{:#}", err);
            return TaskStatus::Fail;
        }
    };

    let start_time = Instant::now();
    let image_8bit_name = match process_task(cloud, bitifier, task) {
        Ok(name) => {
            info!(duration = &*format!("{:?}", start_time.elapsed()); "Task successful");
            Some(name)
        }
        Err(err) => {
            error!(duration = &*format!("{:?}", start_time.elapsed()); "Task failed: {:#}", err);
            None
        }
    };

    let update = TaskUpdate {
        id: key,
        status: image_8bit_name.is_some(),
        image_8bit_name: image_8bit_name.unwrap_or_default(),
    };
    match cloud.send_update(&update) {
        Ok(()) => {
            info!("Successfully sent metadata to app for {}", update.id);
            TaskStatus::Pass
        }
        Err(err) => {
            error!("{:#}", err);
            TaskStatus::Fail
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::daemon::client::LeaseError;
    use crate::database::schema::task::{TaskPayload, TaskSchema};
    use crate::imaging::{BitifySettings, encode_png};
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory stand-in for the web app.
    #[derive(Default)]
    pub struct FakeCloud {
        pub leases: Mutex<VecDeque<Result<Vec<LeasedTask>, LeaseError>>>,
        pub images: Mutex<Vec<(String, Vec<u8>)>>,
        pub uploads: Mutex<Vec<String>>,
        pub updates: Mutex<Vec<TaskUpdate>>,
        pub deleted: Mutex<Vec<String>>,
        pub reject_updates: bool,
    }

    impl FakeCloud {
        pub fn with_image(self, url: &str, bytes: Vec<u8>) -> Self {
            self.images.lock().unwrap().push((url.to_string(), bytes));
            self
        }
    }

    impl CloudServices for FakeCloud {
        fn lease_tasks(&self) -> Result<Vec<LeasedTask>, LeaseError> {
            self.leases.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
        }

        fn delete_task(&self, task: &LeasedTask) -> Result<()> {
            self.deleted.lock().unwrap().push(task.id.clone());
            Ok(())
        }

        fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
            self.images
                .lock()
                .unwrap()
                .iter()
                .find(|(known, _)| known == url)
                .map(|(_, bytes)| bytes.clone())
                .ok_or_else(|| anyhow::anyhow!("404 for {url}"))
        }

        fn upload_processed(&self, name: &str, png: Vec<u8>) -> Result<()> {
            assert_eq!(image::guess_format(&png).unwrap(), image::ImageFormat::Png);
            self.uploads.lock().unwrap().push(name.to_string());
            Ok(())
        }

        fn send_update(&self, update: &TaskUpdate) -> Result<()> {
            self.updates.lock().unwrap().push(update.clone());
            if self.reject_updates {
                anyhow::bail!("Unexpected app response: 500");
            }
            Ok(())
        }
    }

    pub fn leased(id: u64, key: &str, image_link: &str) -> LeasedTask {
        let payload = serde_json::to_vec(&TaskPayload {
            key: key.to_string(),
            image_link: image_link.to_string(),
        })
        .unwrap();
        TaskSchema {
            payload,
            enqueue_timestamp: 0,
            lease_expires: 0,
            retry_count: 1,
        }
        .to_leased("imagetasks", id)
    }

    pub fn small_png() -> Vec<u8> {
        encode_png(&RgbImage::from_fn(16, 12, |x, y| {
            Rgb([(x * 16) as u8, (y * 20) as u8, 90])
        }))
        .unwrap()
    }

    pub fn plain_bitifier() -> Bitifier {
        Bitifier::new(BitifySettings::default(), None, Vec::new())
    }

    #[test]
    fn successful_task_uploads_and_reports() {
        let cloud = FakeCloud::default().with_image("http://app/storage/up/cat_1", small_png());
        let task = leased(1, "key-1", "http://app/storage/up/cat_1");
        assert_eq!(run_task(&cloud, &plain_bitifier(), &task), TaskStatus::Pass);

        let uploads = cloud.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].starts_with("cat_1_"));
        let updates = cloud.updates.lock().unwrap();
        assert_eq!(
            updates[0],
            TaskUpdate {
                id: "key-1".to_string(),
                status: true,
                image_8bit_name: uploads[0].clone(),
            }
        );
    }

    #[test]
    fn failed_download_still_reports() {
        let cloud = FakeCloud::default();
        let task = leased(2, "key-2", "http://app/storage/up/missing");
        assert_eq!(run_task(&cloud, &plain_bitifier(), &task), TaskStatus::Pass);
        let updates = cloud.updates.lock().unwrap();
        assert!(!updates[0].status);
        assert!(updates[0].image_8bit_name.is_empty());
        assert!(cloud.uploads.lock().unwrap().is_empty());
    }

    #[test]
    fn rejected_callback_fails_the_task() {
        let cloud = FakeCloud {
            reject_updates: true,
            ..FakeCloud::default()
        }
        .with_image("http://app/x", small_png());
        let task = leased(3, "key-3", "http://app/x");
        assert_eq!(run_task(&cloud, &plain_bitifier(), &task), TaskStatus::Fail);
    }

    #[test]
    fn undecodable_payload_fails_without_callback() {
        let cloud = FakeCloud::default();
        let mut task = leased(4, "key-4", "http://app/x");
        task.payload_base64 = "!!!".to_string();
        assert_eq!(run_task(&cloud, &plain_bitifier(), &task), TaskStatus::Fail);
        assert!(cloud.updates.lock().unwrap().is_empty());
    }
}
