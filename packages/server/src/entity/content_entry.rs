use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "content_entry")]
pub struct Model {
    /// Lowercase hex SHA-256; one row per distinct content.
    #[sea_orm(primary_key, auto_increment = false)]
    pub fingerprint: String,

    /// Permanent blob key.
    pub storage_key: String,

    pub byte_size: i64,

    /// Number of `logical_file` rows carrying this fingerprint.
    pub reference_count: i64,

    /// The `logical_file` that duplicates point at.
    pub original_file_id: Uuid,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
