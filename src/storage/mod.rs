pub mod notification;
pub mod policy;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::database::Store;
use crate::database::schema::object::ObjectSchema;
use crate::utils::now_millis;

pub const OWNER_METADATA_KEY: &str = "owner";

/// Filesystem buckets with their metadata kept in the datastore.
pub struct ObjectStore {
    root: PathBuf,
    store: Arc<Store>,
}

/// Owner entity attached to every stored object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectOwner {
    pub entity: String,
}

/// The object resource carried by change notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResource {
    #[serde(default)]
    pub kind: String,
    pub bucket: String,
    pub name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub owner: Option<ObjectOwner>,
}

impl ObjectResource {
    /// Owner from the upload metadata, else the owning entity.
    pub fn owner_name(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get(OWNER_METADATA_KEY))
            .or(self.owner.as_ref().map(|owner| &owner.entity))
            .map(String::as_str)
            .filter(|owner| !owner.trim().is_empty())
    }
}

/// Bucket and object names must be a single, non-hidden path segment.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 512 {
        bail!("{kind} name must be between 1 and 512 bytes");
    }
    if name.starts_with('.') || name.contains(['/', '\\', '\0']) {
        bail!("{kind} name {name:?} is not a plain path segment");
    }
    Ok(())
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>, store: Arc<Store>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create object root {:?}", root))?;
        Ok(Self { root, store })
    }

    fn object_path(&self, bucket: &str, name: &str) -> Result<PathBuf> {
        validate_name("bucket", bucket)?;
        validate_name("object", name)?;
        Ok(self.root.join(bucket).join(name))
    }

    pub fn put(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
        owner: Option<&str>,
    ) -> Result<ObjectResource> {
        let path = self.object_path(bucket, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create bucket directory {:?}", parent))?;
        }
        fs::write(&path, bytes).with_context(|| format!("failed to write object {:?}", path))?;

        let meta = ObjectSchema {
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            owner: owner.map(str::to_string),
            created: now_millis(),
        };
        self.store
            .put_object_meta(bucket, name, &meta)
            .with_context(|| format!("failed to record metadata of {bucket}/{name}"))?;
        Ok(resource_for(bucket, name, &meta))
    }

    pub fn exists(&self, bucket: &str, name: &str) -> Result<bool> {
        if validate_name("bucket", bucket).is_err() || validate_name("object", name).is_err() {
            return Ok(false);
        }
        Ok(self.store.get_object_meta(bucket, name)?.is_some())
    }

    pub fn get(&self, bucket: &str, name: &str) -> Result<Option<(ObjectSchema, Vec<u8>)>> {
        let path = self.object_path(bucket, name)?;
        let Some(meta) = self.store.get_object_meta(bucket, name)? else {
            return Ok(None);
        };
        let bytes = fs::read(&path).with_context(|| format!("failed to read object {:?}", path))?;
        Ok(Some((meta, bytes)))
    }
}

fn resource_for(bucket: &str, name: &str, meta: &ObjectSchema) -> ObjectResource {
    let metadata = meta.owner.as_ref().map(|owner| {
        BTreeMap::from([(OWNER_METADATA_KEY.to_string(), owner.clone())])
    });
    ObjectResource {
        kind: "storage#object".to_string(),
        bucket: bucket.to_string(),
        name: name.to_string(),
        content_type: Some(meta.content_type.clone()),
        size: Some(meta.size.to_string()),
        metadata,
        owner: Some(ObjectOwner {
            entity: "project-owners".to_string(),
        }),
    }
}

/// Public URL under which an object is served.
pub fn serving_url(public_base: &str, bucket: &str, name: &str) -> String {
    format!("{}/storage/{}/{}", public_base.trim_end_matches('/'), bucket, name)
}
