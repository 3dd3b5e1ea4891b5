use chrono::Utc;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Set, sea_query::OnConflict};
use tracing::warn;

use crate::alerting::settings::AlertSettings;
use crate::db::entities::setting;

/// Key of the document holding alert configuration under `alerts`.
pub const GLOBAL_SETTINGS_KEY: &str = "global";

/// Retrieves a setting by its key.
pub async fn get_setting<C>(db: &C, key: &str) -> Result<Option<setting::Model>, DbErr>
where
    C: ConnectionTrait,
{
    setting::Entity::find_by_id(key.to_owned()).one(db).await
}

/// Creates or updates a setting.
pub async fn update_setting<C>(db: &C, key: &str, value: &serde_json::Value) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    let row = setting::ActiveModel {
        key: Set(key.to_owned()),
        value: Set(value.clone()),
        updated_at: Set(Utc::now()),
    };
    setting::Entity::insert(row)
        .on_conflict(
            OnConflict::column(setting::Column::Key)
                .update_columns([setting::Column::Value, setting::Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Loads alert settings merged over defaults.
///
/// A missing or unreadable `alerts` block yields the defaults.
pub async fn load_alert_settings<C>(db: &C) -> Result<AlertSettings, DbErr>
where
    C: ConnectionTrait,
{
    let Some(stored) = get_setting(db, GLOBAL_SETTINGS_KEY).await? else {
        return Ok(AlertSettings::default());
    };

    let Some(alerts) = stored.value.get("alerts") else {
        return Ok(AlertSettings::default());
    };

    match serde_json::from_value::<AlertSettings>(alerts.clone()) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            warn!(error = %e, "Stored alert settings are malformed. Using defaults.");
            Ok(AlertSettings::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_db;
    use serde_json::json;

    #[tokio::test]
    async fn defaults_when_nothing_stored() {
        let db = memory_db().await;
        let settings = load_alert_settings(&db).await.unwrap();
        assert_eq!(settings, AlertSettings::default());
    }

    #[tokio::test]
    async fn update_setting_upserts() {
        let db = memory_db().await;
        update_setting(&db, GLOBAL_SETTINGS_KEY, &json!({ "alerts": { "enabled": false } }))
            .await
            .unwrap();
        update_setting(&db, GLOBAL_SETTINGS_KEY, &json!({ "alerts": { "dedup_minutes": 60 } }))
            .await
            .unwrap();

        let stored = get_setting(&db, GLOBAL_SETTINGS_KEY).await.unwrap().unwrap();
        assert_eq!(stored.value, json!({ "alerts": { "dedup_minutes": 60 } }));

        let settings = load_alert_settings(&db).await.unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.dedup_minutes, 60);
    }

    #[tokio::test]
    async fn malformed_alerts_block_falls_back() {
        let db = memory_db().await;
        update_setting(&db, GLOBAL_SETTINGS_KEY, &json!({ "alerts": { "enabled": "yes" } }))
            .await
            .unwrap();

        let settings = load_alert_settings(&db).await.unwrap();
        assert_eq!(settings, AlertSettings::default());
    }
}
