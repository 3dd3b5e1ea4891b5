//! SeaORM entities for the ingestion and alerting tables.

pub mod alert_dedup;
pub mod alert_event;
pub mod disk_physical;
pub mod disk_volume;
pub mod endpoint;
pub mod logged_in_user;
pub mod network_interface;
pub mod setting;
pub mod snapshot;

pub mod prelude {
    pub use super::endpoint::Entity as Endpoint;
    pub use super::endpoint::Model as EndpointModel;

    pub use super::snapshot::Entity as Snapshot;
    pub use super::snapshot::Model as SnapshotModel;

    pub use super::disk_physical::Entity as DiskPhysical;
    pub use super::disk_volume::Entity as DiskVolume;
    pub use super::network_interface::Entity as NetworkInterface;
    pub use super::logged_in_user::Entity as LoggedInUser;

    pub use super::setting::Entity as Setting;

    pub use super::alert_event::Entity as AlertEvent;
    pub use super::alert_event::Model as AlertEventModel;

    pub use super::alert_dedup::Entity as AlertDedup;
}
