use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A registered agent. Rows are deactivated, never deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "endpoints")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub hostname: String,
    #[sea_orm(unique, indexed)]
    pub machine_id: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub is_active: bool,
    pub last_seen: Option<ChronoDateTimeUtc>,
    pub last_interval_seconds: Option<i32>,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::snapshot::Entity")]
    Snapshot,
}

impl Related<super::snapshot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Snapshot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
