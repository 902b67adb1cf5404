use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One upload batch exposed at a public link.
///
/// `expires_at = None` never expires; `password_hash = Some(_)` marks the
/// share as locked.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shares")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub public_id: String,
    pub owner_id: String,
    pub created_at: DateTimeUtc,
    pub expires_at: Option<DateTimeUtc>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_shared: bool,
}

impl Model {
    pub fn is_expired_at(&self, now: DateTimeUtc) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at < now)
    }

    pub fn is_locked(&self) -> bool {
        self.password_hash.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::OwnerId",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Owner,
    #[sea_orm(has_many = "super::file_records::Entity")]
    FileRecords,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::file_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
