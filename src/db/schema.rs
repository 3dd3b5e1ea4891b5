use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::debug;

use crate::db::entities::prelude::*;

/// Creates every table this service owns if it does not exist yet.
/// Parents are created before children so foreign keys resolve.
pub async fn ensure_schema<C>(db: &C) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    create_table(db, Endpoint).await?;
    create_table(db, Snapshot).await?;
    create_table(db, DiskPhysical).await?;
    create_table(db, DiskVolume).await?;
    create_table(db, NetworkInterface).await?;
    create_table(db, LoggedInUser).await?;
    create_table(db, Setting).await?;
    create_table(db, AlertEvent).await?;
    create_table(db, AlertDedup).await?;
    Ok(())
}

async fn create_table<C, E>(db: &C, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(backend.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }

    debug!(table = entity.table_name(), "Table ensured.");
    Ok(())
}
