pub mod ops;
pub mod schema;

use anyhow::{Context, Result};
use log::info;
use redb::{Database, ReadableDatabase};
use std::path::Path;

use crate::database::schema::bitdoc::{BITDOC_TABLE, BITDOC_TIMESTAMP_INDEX};
use crate::database::schema::object::OBJECT_TABLE;
use crate::database::schema::task::{QUEUE_SEQUENCE_TABLE, TASK_TABLE};

/// The datastore: Bitdocs, queued tasks and stored-object metadata in one redb file.
pub struct Store {
    pub in_disk: Database,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {:?}", parent))?;
        }
        let in_disk = Database::create(path)
            .with_context(|| format!("failed to open datastore {:?}", path))?;
        let store = Self { in_disk };
        store.initialize_tables()?;
        Ok(store)
    }

    fn initialize_tables(&self) -> Result<()> {
        info!("Initializing database tables...");
        let txn = self.begin_write()?;
        let _ = txn.open_table(BITDOC_TABLE)?;
        let _ = txn.open_table(BITDOC_TIMESTAMP_INDEX)?;
        let _ = txn.open_table(TASK_TABLE)?;
        let _ = txn.open_table(QUEUE_SEQUENCE_TABLE)?;
        let _ = txn.open_table(OBJECT_TABLE)?;
        txn.commit()?;
        info!("Database tables initialized successfully.");
        Ok(())
    }

    pub fn begin_read(&self) -> Result<redb::ReadTransaction> {
        Ok(self.in_disk.begin_read()?)
    }

    pub fn begin_write(&self) -> Result<redb::WriteTransaction> {
        Ok(self.in_disk.begin_write()?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Store;
    use tempfile::TempDir;

    pub fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().expect("tempdir should be created");
        let store = Store::open(dir.path().join("test.redb")).expect("store should open");
        (dir, store)
    }
}
