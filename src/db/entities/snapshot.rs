use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "snapshots")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub endpoint_id: i32,
    pub schema_version: String,
    #[sea_orm(indexed)]
    pub timestamp_utc: ChronoDateTimeUtc,
    pub interval_seconds: i32,
    pub cpu_utilization_pct: Option<f64>,
    pub cpu_idle_pct: Option<f64>,
    pub mem_total_bytes: Option<i64>,
    pub mem_used_bytes: Option<i64>,
    pub mem_free_bytes: Option<i64>,
    pub mem_used_pct: Option<f64>,
    pub users_count: Option<i32>,
    // Verbatim payload, kept for audit and replay.
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_payload: Json,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::endpoint::Entity",
        from = "Column::EndpointId",
        to = "super::endpoint::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    Endpoint,
    #[sea_orm(has_many = "super::disk_physical::Entity")]
    DiskPhysical,
    #[sea_orm(has_many = "super::disk_volume::Entity")]
    DiskVolume,
    #[sea_orm(has_many = "super::network_interface::Entity")]
    NetworkInterface,
    #[sea_orm(has_many = "super::logged_in_user::Entity")]
    LoggedInUser,
}

impl Related<super::endpoint::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Endpoint.def()
    }
}

impl Related<super::disk_physical::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiskPhysical.def()
    }
}

impl Related<super::disk_volume::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiskVolume.def()
    }
}

impl Related<super::network_interface::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NetworkInterface.def()
    }
}

impl Related<super::logged_in_user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoggedInUser.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
