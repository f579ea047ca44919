use anyhow::{Result, anyhow, bail};
use arrayvec::ArrayString;
use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::utils::{format_millis, html_escape, now_millis};

// Key: Bitdoc key -> Value: BitdocSchema (bitcode)
pub const BITDOC_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("bitdoc");

// Key: (creation millis, Bitdoc key). Iterated backwards for newest-first listings.
pub const BITDOC_TIMESTAMP_INDEX: TableDefinition<(i64, &str), ()> =
    TableDefinition::new("bitdoc_timestamp");

/// One uploaded image and, once the worker reported back, its bitified counterpart.
#[derive(Debug, Clone, PartialEq, Eq, bitcode::Encode, bitcode::Decode)]
pub struct BitdocSchema {
    pub key: ArrayString<64>,
    pub user: String,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
    pub image_link: String,
    pub file_name: Option<String>,
    pub image_8bit_link: Option<String>,
    pub timestamp_8bit: Option<i64>,
}

impl BitdocSchema {
    pub fn new(
        user: impl Into<String>,
        image_link: impl Into<String>,
        file_name: Option<String>,
    ) -> Result<Self> {
        let user = user.into();
        let image_link = image_link.into();
        if user.trim().is_empty() {
            bail!("Bitdoc requires an owner");
        }
        if image_link.trim().is_empty() {
            bail!("Bitdoc requires an image link");
        }
        let key = ArrayString::from(&uuid::Uuid::new_v4().to_string())
            .map_err(|_| anyhow!("generated key does not fit"))?;
        Ok(Self {
            key,
            user,
            timestamp: now_millis(),
            image_link,
            file_name,
            image_8bit_link: None,
            timestamp_8bit: None,
        })
    }

    pub fn is_processed(&self) -> bool {
        self.image_8bit_link.is_some()
    }

    pub fn timestamp_strsafe(&self) -> Option<String> {
        format_millis(self.timestamp)
    }

    pub fn timestamp_8bit_strsafe(&self) -> Option<String> {
        self.timestamp_8bit.and_then(format_millis)
    }

    pub fn file_name_strsafe(&self) -> Option<String> {
        self.file_name.as_deref().map(html_escape)
    }

    pub fn to_response(&self) -> BitdocResponse {
        BitdocResponse {
            user: self.user.clone(),
            timestamp: self.timestamp_strsafe(),
            image_link: self.image_link.clone(),
            image_8bit_link: self.image_8bit_link.clone(),
            timestamp_8bit: self.timestamp_8bit_strsafe(),
            key: self.key.to_string(),
        }
    }
}

/// Wire form of a Bitdoc, shared by the JSON entry view and the RPC listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BitdocResponse {
    pub user: String,
    pub timestamp: Option<String>,
    pub image_link: String,
    pub image_8bit_link: Option<String>,
    pub timestamp_8bit: Option<String>,
    pub key: String,
}
