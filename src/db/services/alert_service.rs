//! Alert dedup ledger and the alert event audit log.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel, QueryOrder, Set,
};
use tracing::debug;

use crate::db::entities::{alert_dedup, alert_event};
use crate::db::enums::AlertType;

/// Returns `true` when `key` has not fired within the last `window_minutes`.
///
/// The first call for a key always fires. A firing call records `now` as the
/// new last-fired time; a suppressed call leaves the ledger untouched.
pub async fn should_fire<C>(db: &C, key: &str, window_minutes: i64) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    should_fire_at(db, key, window_minutes, Utc::now()).await
}

pub async fn should_fire_at<C>(
    db: &C,
    key: &str,
    window_minutes: i64,
    now: DateTime<Utc>,
) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let existing = alert_dedup::Entity::find_by_id(key.to_owned()).one(db).await?;

    let Some(record) = existing else {
        alert_dedup::ActiveModel {
            key: Set(key.to_owned()),
            last_fired_at: Set(now),
            is_active: Set(true),
        }
        .insert(db)
        .await?;
        debug!(%key, "First firing for alert key.");
        return Ok(true);
    };

    // Windows too long for a TimeDelta saturate instead of panicking.
    let window = Duration::try_minutes(window_minutes.max(0)).unwrap_or(Duration::MAX);
    if now - record.last_fired_at < window {
        debug!(%key, last_fired_at = %record.last_fired_at, "Alert suppressed by dedup window.");
        return Ok(false);
    }

    let mut active = record.into_active_model();
    active.last_fired_at = Set(now);
    active.is_active = Set(true);
    active.update(db).await?;
    Ok(true)
}

/// Appends an alert event.
pub async fn record_alert_event<C>(
    db: &C,
    alert_type: AlertType,
    endpoint_id: Option<i32>,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
) -> Result<alert_event::Model, DbErr>
where
    C: ConnectionTrait,
{
    alert_event::ActiveModel {
        alert_type: Set(alert_type),
        endpoint_id: Set(endpoint_id),
        details: Set(details),
        created_at: Set(created_at),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// All recorded alert events, oldest first.
pub async fn list_alert_events<C>(db: &C) -> Result<Vec<alert_event::Model>, DbErr>
where
    C: ConnectionTrait,
{
    alert_event::Entity::find()
        .order_by_asc(alert_event::Column::Id)
        .all(db)
        .await
}
