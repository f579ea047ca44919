use anyhow::Result;
use redb::ReadableTable;

use crate::database::Store;
use crate::database::schema::object::{OBJECT_TABLE, ObjectSchema};

impl Store {
    pub fn put_object_meta(&self, bucket: &str, name: &str, meta: &ObjectSchema) -> Result<()> {
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(OBJECT_TABLE)?;
            let encoded = bitcode::encode(meta);
            table.insert((bucket, name), encoded.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_object_meta(&self, bucket: &str, name: &str) -> Result<Option<ObjectSchema>> {
        let txn = self.begin_read()?;
        let table = txn.open_table(OBJECT_TABLE)?;
        match table.get((bucket, name))? {
            Some(bytes) => Ok(Some(bitcode::decode(bytes.value())?)),
            None => Ok(None),
        }
    }
}
