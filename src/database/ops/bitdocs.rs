use anyhow::{Context, Result};
use redb::ReadableTable;

use crate::database::Store;
use crate::database::schema::bitdoc::{BITDOC_TABLE, BITDOC_TIMESTAMP_INDEX, BitdocSchema};

/// Result of recording a worker callback against a Bitdoc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedUpdate {
    Updated(BitdocSchema),
    NotFound,
    /// The processed fields were already set; the record was left untouched.
    AlreadyProcessed(BitdocSchema),
}

impl Store {
    pub fn insert_bitdoc(&self, bitdoc: &BitdocSchema) -> Result<()> {
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(BITDOC_TABLE)?;
            let mut index = txn.open_table(BITDOC_TIMESTAMP_INDEX)?;
            let encoded = bitcode::encode(bitdoc);
            table.insert(bitdoc.key.as_str(), encoded.as_slice())?;
            index.insert((bitdoc.timestamp, bitdoc.key.as_str()), ())?;
        }
        txn.commit()
            .with_context(|| format!("failed to commit Bitdoc {}", bitdoc.key))?;
        Ok(())
    }

    pub fn get_bitdoc(&self, key: impl AsRef<str>) -> Result<Option<BitdocSchema>> {
        let txn = self.begin_read()?;
        let table = txn.open_table(BITDOC_TABLE)?;
        match table.get(key.as_ref())? {
            Some(bytes) => Ok(Some(bitcode::decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Returns whether a Bitdoc was removed.
    pub fn delete_bitdoc(&self, key: impl AsRef<str>) -> Result<bool> {
        let key = key.as_ref();
        let txn = self.begin_write()?;
        let removed = {
            let mut table = txn.open_table(BITDOC_TABLE)?;
            let removed: Option<BitdocSchema> = match table.remove(key)? {
                Some(bytes) => Some(bitcode::decode(bytes.value())?),
                None => None,
            };
            if let Some(bitdoc) = &removed {
                let mut index = txn.open_table(BITDOC_TIMESTAMP_INDEX)?;
                index.remove((bitdoc.timestamp, key))?;
            }
            removed.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Newest first.
    pub fn list_bitdocs(&self, limit: usize, offset: usize) -> Result<Vec<BitdocSchema>> {
        let txn = self.begin_read()?;
        let index = txn.open_table(BITDOC_TIMESTAMP_INDEX)?;
        let table = txn.open_table(BITDOC_TABLE)?;

        let mut bitdocs = Vec::with_capacity(limit.min(256));
        for entry in index.iter()?.rev().skip(offset).take(limit) {
            let (index_key, _) = entry?;
            let (_, key) = index_key.value();
            if let Some(bytes) = table.get(key)? {
                bitdocs.push(bitcode::decode(bytes.value())?);
            }
        }
        Ok(bitdocs)
    }

    /// Store the processed link once. Later calls leave the record as it is.
    pub fn set_processed(
        &self,
        key: impl AsRef<str>,
        image_8bit_link: impl Into<String>,
        timestamp_8bit: i64,
    ) -> Result<ProcessedUpdate> {
        let key = key.as_ref();
        let txn = self.begin_write()?;
        let outcome = {
            let mut table = txn.open_table(BITDOC_TABLE)?;
            let existing: Option<BitdocSchema> = match table.get(key)? {
                Some(bytes) => Some(bitcode::decode(bytes.value())?),
                None => None,
            };
            match existing {
                None => ProcessedUpdate::NotFound,
                Some(bitdoc) if bitdoc.is_processed() => ProcessedUpdate::AlreadyProcessed(bitdoc),
                Some(mut bitdoc) => {
                    bitdoc.image_8bit_link = Some(image_8bit_link.into());
                    bitdoc.timestamp_8bit = Some(timestamp_8bit);
                    let encoded = bitcode::encode(&bitdoc);
                    table.insert(key, encoded.as_slice())?;
                    ProcessedUpdate::Updated(bitdoc)
                }
            }
        };
        txn.commit()?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::temp_store;

    fn bitdoc_at(user: &str, timestamp: i64) -> BitdocSchema {
        let mut bitdoc = BitdocSchema::new(user, format!("http://img/{user}"), None).unwrap();
        bitdoc.timestamp = timestamp;
        bitdoc
    }

    #[test]
    fn insert_then_get() {
        let (_dir, store) = temp_store();
        let bitdoc = bitdoc_at("alice", 10);
        store.insert_bitdoc(&bitdoc).unwrap();
        assert_eq!(store.get_bitdoc(bitdoc.key).unwrap(), Some(bitdoc));
        assert_eq!(store.get_bitdoc("missing").unwrap(), None);
    }

    #[test]
    fn list_is_newest_first_with_offset() {
        let (_dir, store) = temp_store();
        for (user, ts) in [("a", 1), ("c", 3), ("b", 2), ("d", 4)] {
            store.insert_bitdoc(&bitdoc_at(user, ts)).unwrap();
        }
        let users: Vec<String> = store
            .list_bitdocs(10, 0)
            .unwrap()
            .into_iter()
            .map(|b| b.user)
            .collect();
        assert_eq!(users, ["d", "c", "b", "a"]);

        let page: Vec<String> = store
            .list_bitdocs(2, 1)
            .unwrap()
            .into_iter()
            .map(|b| b.user)
            .collect();
        assert_eq!(page, ["c", "b"]);
    }

    #[test]
    fn delete_removes_record_and_index() {
        let (_dir, store) = temp_store();
        let bitdoc = bitdoc_at("alice", 5);
        store.insert_bitdoc(&bitdoc).unwrap();
        assert!(store.delete_bitdoc(bitdoc.key).unwrap());
        assert!(!store.delete_bitdoc(bitdoc.key).unwrap());
        assert!(store.list_bitdocs(10, 0).unwrap().is_empty());
    }

    #[test]
    fn processed_fields_are_set_once() {
        let (_dir, store) = temp_store();
        let bitdoc = bitdoc_at("alice", 5);
        store.insert_bitdoc(&bitdoc).unwrap();
        assert!(!store.get_bitdoc(bitdoc.key).unwrap().unwrap().is_processed());

        let first = store.set_processed(bitdoc.key, "http://img/8bit", 99).unwrap();
        let ProcessedUpdate::Updated(updated) = first else {
            panic!("expected an update, got {first:?}");
        };
        assert_eq!(updated.image_8bit_link.as_deref(), Some("http://img/8bit"));
        assert_eq!(updated.timestamp_8bit, Some(99));

        let second = store.set_processed(bitdoc.key, "http://img/other", 100).unwrap();
        assert!(matches!(second, ProcessedUpdate::AlreadyProcessed(_)));
        let stored = store.get_bitdoc(bitdoc.key).unwrap().unwrap();
        assert_eq!(stored.image_8bit_link.as_deref(), Some("http://img/8bit"));

        assert_eq!(
            store.set_processed("missing", "x", 1).unwrap(),
            ProcessedUpdate::NotFound
        );
    }
}
