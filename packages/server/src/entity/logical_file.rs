use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "logical_file")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Name supplied by the uploader.
    pub display_name: String,

    /// MIME type supplied by the uploader or guessed from the name.
    pub media_type: String,

    pub byte_size: i64,

    /// Lowercase hex SHA-256 of the content.
    pub fingerprint: String,

    /// Whether the content was already stored when this record was created.
    pub is_duplicate: bool,

    /// Canonical record for the fingerprint. `None` on the canonical record itself.
    pub original_file_id: Option<Uuid>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
