use redb::TableDefinition;

// Key: (bucket, object name) -> Value: ObjectSchema (bitcode)
pub const OBJECT_TABLE: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("object");

/// Metadata of one stored object. The bytes live on disk next to the datastore.
#[derive(Debug, Clone, PartialEq, Eq, bitcode::Encode, bitcode::Decode)]
pub struct ObjectSchema {
    pub content_type: String,
    pub size: u64,
    /// `x-goog-meta-owner` metadata supplied with the upload.
    pub owner: Option<String>,
    pub created: i64,
}
