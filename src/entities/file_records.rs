use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub share_id: i32,
    /// Display name as uploaded. Never used to build a filesystem path.
    pub filename: String,
    /// Storage key of the blob, owned exclusively by this record
    #[sea_orm(unique)]
    pub storage_path: String,
    pub size: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shares::Entity",
        from = "Column::ShareId",
        to = "super::shares::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Shares,
}

impl Related<super::shares::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shares.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
