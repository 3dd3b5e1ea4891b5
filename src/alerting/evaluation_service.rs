use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult,
    QueryFilter, QueryOrder, Statement, TransactionTrait,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::settings::AlertSettings;
use crate::db::entities::{disk_volume, endpoint};
use crate::db::enums::AlertType;
use crate::db::services::{alert_service, settings_service};
use crate::notifications::AlertNotifier;

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Database query error: {0}")]
    Database(#[from] DbErr),
}

/// Alerts fired by one evaluation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    pub heartbeat_alerts: usize,
    pub low_disk_alerts: usize,
}

/// Allowed silence before an endpoint counts as overdue.
///
/// Scales with the endpoint's own reporting interval, floored at `min_grace_seconds`.
pub fn heartbeat_grace_seconds(
    min_grace_seconds: i64,
    grace_multiplier: i64,
    last_interval_seconds: i32,
) -> i64 {
    min_grace_seconds.max(grace_multiplier.saturating_mul(i64::from(last_interval_seconds)))
}

/// Dedup key for the fleet-wide low-disk alert. Changing the threshold changes the key.
pub fn low_disk_key(threshold_free_pct: f64) -> String {
    format!("lowdisk:global:{}", (threshold_free_pct * 10.0) as i64)
}

/// Each endpoint's newest snapshot; ties on the timestamp go to the highest id.
const LATEST_SNAPSHOTS_SQL: &str = r#"
    SELECT s.id, s.endpoint_id
    FROM snapshots s
    WHERE NOT EXISTS (
        SELECT 1 FROM snapshots n
        WHERE n.endpoint_id = s.endpoint_id
          AND (n.timestamp_utc > s.timestamp_utc
               OR (n.timestamp_utc = s.timestamp_utc AND n.id > s.id))
    )
"#;

#[derive(Debug, FromQueryResult)]
struct LatestSnapshot {
    id: i32,
    endpoint_id: i32,
}

pub struct EvaluationService {
    db: DatabaseConnection,
    notifier: Arc<dyn AlertNotifier>,
}

impl EvaluationService {
    pub fn new(db: DatabaseConnection, notifier: Arc<dyn AlertNotifier>) -> Self {
        Self { db, notifier }
    }

    pub async fn run_once(&self) -> Result<EvaluationSummary, EvaluationError> {
        self.run_at(Utc::now()).await
    }

    /// Evaluates both rules as of `now`.
    ///
    /// A failing rule does not stop the other from running; the first error is
    /// returned after both have been attempted.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<EvaluationSummary, EvaluationError> {
        let settings = settings_service::load_alert_settings(&self.db).await?;
        if !settings.enabled {
            debug!("Alerting disabled. Skipping evaluation.");
            return Ok(EvaluationSummary::default());
        }

        let heartbeat = self.evaluate_heartbeats(&settings, now).await;
        if let Err(e) = &heartbeat {
            error!(error = %e, "Heartbeat rule failed.");
        }
        let low_disk = self.evaluate_low_disk(&settings, now).await;
        if let Err(e) = &low_disk {
            error!(error = %e, "Low-disk rule failed.");
        }

        Ok(EvaluationSummary {
            heartbeat_alerts: heartbeat?,
            low_disk_alerts: low_disk?,
        })
    }

    async fn evaluate_heartbeats(
        &self,
        settings: &AlertSettings,
        now: DateTime<Utc>,
    ) -> Result<usize, EvaluationError> {
        let endpoints = endpoint::Entity::find()
            .filter(endpoint::Column::IsActive.eq(true))
            .order_by_asc(endpoint::Column::Id)
            .all(&self.db)
            .await?;

        let mut fired = 0;
        for endpoint in endpoints {
            let (Some(last_seen), Some(interval)) = (endpoint.last_seen, endpoint.last_interval_seconds)
            else {
                continue;
            };

            let grace_seconds = heartbeat_grace_seconds(
                settings.heartbeat_min_grace_seconds,
                settings.heartbeat_grace_multiplier,
                interval,
            );
            let grace = Duration::try_seconds(grace_seconds.max(0)).unwrap_or(Duration::MAX);
            if now - last_seen <= grace {
                continue;
            }

            let key = format!("heartbeat:{}", endpoint.id);
            let details = json!({
                "endpoint_id": endpoint.id,
                "hostname": endpoint.hostname,
                "machine_id": endpoint.machine_id,
                "last_seen": last_seen.to_rfc3339(),
                "grace_seconds": grace_seconds,
            });

            let recorded = self
                .record_if_due(AlertType::Heartbeat, &key, settings, Some(endpoint.id), &details, now)
                .await?;
            if !recorded {
                continue;
            }

            info!(endpoint_id = endpoint.id, hostname = %endpoint.hostname, grace_seconds, "Heartbeat missing.");
            self.notifier
                .notify(
                    &settings.notify,
                    &format!("Heartbeat missing: {}", endpoint.hostname),
                    &pretty(&details),
                )
                .await;
            fired += 1;
        }
        Ok(fired)
    }

    async fn evaluate_low_disk(
        &self,
        settings: &AlertSettings,
        now: DateTime<Utc>,
    ) -> Result<usize, EvaluationError> {
        let threshold = settings.low_disk_free_pct_threshold;

        let latest = LatestSnapshot::find_by_statement(Statement::from_string(
            self.db.get_database_backend(),
            LATEST_SNAPSHOTS_SQL,
        ))
        .all(&self.db)
        .await?;
        if latest.is_empty() {
            return Ok(0);
        }
        let owner: HashMap<i32, i32> = latest.iter().map(|s| (s.id, s.endpoint_id)).collect();

        let low = disk_volume::Entity::find()
            .filter(disk_volume::Column::SnapshotId.is_in(owner.keys().copied()))
            .filter(disk_volume::Column::FreePct.lt(threshold))
            .all(&self.db)
            .await?;
        let mut low: Vec<(i32, disk_volume::Model)> = low
            .into_iter()
            .filter_map(|v| Some((*owner.get(&v.snapshot_id)?, v)))
            .collect();
        if low.is_empty() {
            return Ok(0);
        }
        low.sort_by(|(a_owner, a), (b_owner, b)| (a_owner, &a.mount).cmp(&(b_owner, &b.mount)));

        let endpoints: HashMap<i32, endpoint::Model> = endpoint::Entity::find()
            .filter(endpoint::Column::Id.is_in(low.iter().map(|(owner, _)| *owner)))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();

        let volumes: Vec<Value> = low
            .into_iter()
            .filter_map(|(owner, v)| {
                let endpoint = endpoints.get(&owner)?;
                Some(json!({
                    "endpoint_id": endpoint.id,
                    "hostname": endpoint.hostname,
                    "machine_id": endpoint.machine_id,
                    "mount": v.mount,
                    "free_pct": v.free_pct,
                    "free_bytes": v.free_bytes,
                    "total_bytes": v.total_bytes,
                }))
            })
            .collect();

        if volumes.is_empty() {
            return Ok(0);
        }

        let volume_count = volumes.len();
        let details = json!({
            "threshold_free_pct": threshold,
            "volumes": volumes,
        });
        let key = low_disk_key(threshold);
        if !self
            .record_if_due(AlertType::LowDisk, &key, settings, None, &details, now)
            .await?
        {
            return Ok(0);
        }

        info!(volumes = volume_count, threshold, "Low disk space detected.");
        self.notifier
            .notify(&settings.notify, "Low disk space detected", &pretty(&details))
            .await;
        Ok(1)
    }

    /// Consults the dedup ledger and records the event in one transaction.
    async fn record_if_due(
        &self,
        alert_type: AlertType,
        key: &str,
        settings: &AlertSettings,
        endpoint_id: Option<i32>,
        details: &Value,
        now: DateTime<Utc>,
    ) -> Result<bool, EvaluationError> {
        let txn = self.db.begin().await?;
        let fire = alert_service::should_fire_at(&txn, key, settings.dedup_minutes, now).await?;
        if fire {
            alert_service::record_alert_event(&txn, alert_type, endpoint_id, details.clone(), now)
                .await?;
        }
        txn.commit().await?;
        Ok(fire)
    }
}

fn pretty(details: &Value) -> String {
    serde_json::to_string_pretty(details).unwrap_or_else(|_| details.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::settings::NotifySettings;
    use crate::db::entities::prelude::*;
    use crate::db::services::{
        endpoint_service::register_endpoint, ingest_service::ingest_snapshot,
        settings_service::{GLOBAL_SETTINGS_KEY, update_setting},
    };
    use crate::db::test_support::memory_db;
    use crate::notifications::NotificationService;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use sea_orm::{ActiveModelTrait, IntoActiveModel, PaginatorTrait, Set};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        fn subjects(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
        }
    }

    #[async_trait]
    impl AlertNotifier for RecordingNotifier {
        async fn notify(&self, _channels: &NotifySettings, subject: &str, body: &str) {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    async fn endpoint_last_seen(
        db: &DatabaseConnection,
        machine_id: &str,
        last_seen: DateTime<Utc>,
        interval: i32,
    ) -> endpoint::Model {
        let (endpoint, _) = register_endpoint(db, &format!("host-{machine_id}"), machine_id)
            .await
            .unwrap();
        let mut active = endpoint.into_active_model();
        active.last_seen = Set(Some(last_seen));
        active.last_interval_seconds = Set(Some(interval));
        active.update(db).await.unwrap()
    }

    async fn report_volume(db: &DatabaseConnection, endpoint: endpoint::Model, at: &str, free_pct: f64) {
        let body = json!({
            "schema_version": "1.0",
            "host": { "hostname": endpoint.hostname.clone(), "machine_id": endpoint.machine_id.clone() },
            "timestamp_utc": at,
            "interval_seconds": 60,
            "disk": { "volumes": [
                { "mount": "/", "total_bytes": 1000, "free_bytes": (free_pct * 10.0) as i64, "free_pct": free_pct }
            ] }
        });
        ingest_snapshot(db, endpoint, body).await.unwrap();
    }

    fn service(db: &DatabaseConnection, notifier: Arc<dyn AlertNotifier>) -> EvaluationService {
        EvaluationService::new(db.clone(), notifier)
    }

    #[test]
    fn grace_floor_and_multiplier() {
        assert_eq!(heartbeat_grace_seconds(120, 3, 10), 120);
        assert_eq!(heartbeat_grace_seconds(120, 3, 60), 180);
    }

    #[test]
    fn low_disk_key_tracks_threshold() {
        assert_eq!(low_disk_key(10.0), "lowdisk:global:100");
        assert_eq!(low_disk_key(7.55), "lowdisk:global:75");
    }

    #[tokio::test]
    async fn overdue_endpoint_fires_once_per_window() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let overdue = endpoint_last_seen(&db, "m-1", noon() - Duration::seconds(181), 60).await;
        let boundary = endpoint_last_seen(&db, "m-2", noon() - Duration::seconds(179), 60).await;
        let floored = endpoint_last_seen(&db, "m-3", noon() - Duration::seconds(100), 10).await;

        let svc = service(&db, notifier.clone());
        let summary = svc.run_at(noon()).await.unwrap();
        assert_eq!(summary.heartbeat_alerts, 1);
        assert_eq!(notifier.subjects(), vec!["Heartbeat missing: host-m-1".to_string()]);

        let events = AlertEvent::find().all(&db).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].alert_type, AlertType::Heartbeat);
        assert_eq!(events[0].endpoint_id, Some(overdue.id));
        assert_eq!(events[0].details["grace_seconds"], json!(180));

        // Only m-1 stays in play so the later runs isolate its dedup window.
        for id in [boundary.id, floored.id] {
            crate::db::services::endpoint_service::deactivate_endpoint(&db, id)
                .await
                .unwrap();
        }

        let again = svc.run_at(noon() + Duration::minutes(5)).await.unwrap();
        assert_eq!(again.heartbeat_alerts, 0);
        let later = svc.run_at(noon() + Duration::minutes(15)).await.unwrap();
        assert_eq!(later.heartbeat_alerts, 1);
        assert_eq!(notifier.subjects().len(), 2);
    }

    #[tokio::test]
    async fn inactive_or_unseen_endpoints_are_ignored() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let stale = endpoint_last_seen(&db, "m-1", noon() - Duration::hours(5), 60).await;
        crate::db::services::endpoint_service::deactivate_endpoint(&db, stale.id)
            .await
            .unwrap();
        register_endpoint(&db, "never-reported", "m-2").await.unwrap();

        let summary = service(&db, notifier.clone()).run_at(noon()).await.unwrap();
        assert_eq!(summary, EvaluationSummary::default());
        assert!(notifier.subjects().is_empty());
    }

    #[tokio::test]
    async fn low_disk_volumes_are_batched_into_one_alert() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (a, _) = register_endpoint(&db, "a", "m-a").await.unwrap();
        let (b, _) = register_endpoint(&db, "b", "m-b").await.unwrap();
        report_volume(&db, a, "2025-01-01T11:59:00Z", 4.0).await;
        report_volume(&db, b, "2025-01-01T11:59:00Z", 6.5).await;

        let summary = service(&db, notifier.clone()).run_at(noon()).await.unwrap();
        assert_eq!(summary.low_disk_alerts, 1);
        assert_eq!(notifier.subjects(), vec!["Low disk space detected".to_string()]);

        let events = AlertEvent::find().all(&db).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].alert_type, AlertType::LowDisk);
        assert_eq!(events[0].endpoint_id, None);
        let volumes = events[0].details["volumes"].as_array().unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(events[0].details["threshold_free_pct"], json!(10.0));

        let dedup = AlertDedup::find_by_id("lowdisk:global:100".to_owned())
            .one(&db)
            .await
            .unwrap();
        assert!(dedup.is_some());
    }

    #[tokio::test]
    async fn only_the_latest_snapshot_counts_for_low_disk() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (a, _) = register_endpoint(&db, "a", "m-a").await.unwrap();
        let a_id = a.id;
        report_volume(&db, a, "2025-01-01T11:59:00Z", 50.0).await;
        let a = Endpoint::find_by_id(a_id).one(&db).await.unwrap().unwrap();
        // Older observation arriving later must not count as the latest.
        report_volume(&db, a, "2025-01-01T11:00:00Z", 2.0).await;

        let summary = service(&db, notifier.clone()).run_at(noon()).await.unwrap();
        assert_eq!(summary.low_disk_alerts, 0);
        let low_disk_events = AlertEvent::find()
            .filter(crate::db::entities::alert_event::Column::AlertType.eq(AlertType::LowDisk))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(low_disk_events, 0);
    }

    #[tokio::test]
    async fn latest_snapshot_is_chosen_per_endpoint_in_one_pass() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (a, _) = register_endpoint(&db, "a", "m-a").await.unwrap();
        let (b, _) = register_endpoint(&db, "b", "m-b").await.unwrap();
        let (a_id, b_id) = (a.id, b.id);

        report_volume(&db, a, "2025-01-01T11:59:00Z", 50.0).await;
        let a = Endpoint::find_by_id(a_id).one(&db).await.unwrap().unwrap();
        // Same timestamp, later row: the higher snapshot id wins the tie.
        report_volume(&db, a, "2025-01-01T11:59:00Z", 3.0).await;

        report_volume(&db, b, "2025-01-01T11:00:00Z", 1.0).await;
        let b = Endpoint::find_by_id(b_id).one(&db).await.unwrap().unwrap();
        report_volume(&db, b, "2025-01-01T11:59:00Z", 80.0).await;

        let summary = service(&db, notifier.clone()).run_at(noon()).await.unwrap();
        assert_eq!(summary.low_disk_alerts, 1);

        let event = AlertEvent::find()
            .filter(crate::db::entities::alert_event::Column::AlertType.eq(AlertType::LowDisk))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        let volumes = event.details["volumes"].as_array().unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0]["endpoint_id"], json!(a_id));
        assert_eq!(volumes[0]["free_pct"], json!(3.0));
    }

    #[tokio::test]
    async fn disabled_alerting_is_a_no_op() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        update_setting(&db, GLOBAL_SETTINGS_KEY, &json!({ "alerts": { "enabled": false } }))
            .await
            .unwrap();
        endpoint_last_seen(&db, "m-1", noon() - Duration::hours(1), 60).await;

        let summary = service(&db, notifier.clone()).run_at(noon()).await.unwrap();
        assert_eq!(summary, EvaluationSummary::default());
        assert!(notifier.subjects().is_empty());
        assert_eq!(AlertEvent::find().count(&db).await.unwrap(), 0);
        assert_eq!(AlertDedup::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn settings_drive_thresholds() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        update_setting(
            &db,
            GLOBAL_SETTINGS_KEY,
            &json!({ "alerts": { "heartbeat_min_grace_seconds": 600, "low_disk_free_pct_threshold": 50.0 } }),
        )
        .await
        .unwrap();
        endpoint_last_seen(&db, "m-1", noon() - Duration::seconds(300), 60).await;
        let (b, _) = register_endpoint(&db, "b", "m-b").await.unwrap();
        report_volume(&db, b, "2025-01-01T11:59:00Z", 40.0).await;

        let summary = service(&db, notifier.clone()).run_at(noon()).await.unwrap();
        assert_eq!(summary.heartbeat_alerts, 0);
        assert_eq!(summary.low_disk_alerts, 1);
        assert!(
            AlertDedup::find_by_id("lowdisk:global:500".to_owned())
                .one(&db)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn out_of_range_settings_do_not_stop_either_rule() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        update_setting(
            &db,
            GLOBAL_SETTINGS_KEY,
            &json!({ "alerts": {
                "dedup_minutes": i64::MAX,
                "heartbeat_min_grace_seconds": i64::MAX,
                "heartbeat_grace_multiplier": i64::MAX
            } }),
        )
        .await
        .unwrap();
        endpoint_last_seen(&db, "m-1", noon() - Duration::days(30), 60).await;
        let (b, _) = register_endpoint(&db, "b", "m-b").await.unwrap();
        report_volume(&db, b, "2025-01-01T11:59:00Z", 2.0).await;

        let svc = service(&db, notifier.clone());
        let first = svc.run_at(noon()).await.unwrap();
        assert_eq!(first.heartbeat_alerts, 0);
        assert_eq!(first.low_disk_alerts, 1);

        let second = svc.run_at(noon() + Duration::days(365)).await.unwrap();
        assert_eq!(second, EvaluationSummary::default());
        assert_eq!(notifier.subjects(), vec!["Low disk space detected".to_string()]);
    }

    #[tokio::test]
    async fn channel_failure_keeps_the_event() {
        let db = memory_db().await;
        update_setting(
            &db,
            GLOBAL_SETTINGS_KEY,
            &json!({ "alerts": { "notify": { "webhook": { "enabled": true, "url": "http://127.0.0.1:9/hook" } } } }),
        )
        .await
        .unwrap();
        endpoint_last_seen(&db, "m-1", noon() - Duration::hours(1), 60).await;

        let notifier = Arc::new(
            NotificationService::new(None, std::time::Duration::from_secs(2)).unwrap(),
        );
        let summary = service(&db, notifier).run_at(noon()).await.unwrap();

        assert_eq!(summary.heartbeat_alerts, 1);
        assert_eq!(AlertEvent::find().count(&db).await.unwrap(), 1);
    }
}
