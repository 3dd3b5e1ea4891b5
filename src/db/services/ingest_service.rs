//! Turns one telemetry document into a snapshot row tree.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, Set,
    TransactionTrait,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::db::entities::{
    disk_physical, disk_volume, endpoint, logged_in_user, network_interface, snapshot,
};
use crate::ingest::{TelemetryPayload, ValidationError, unwrap_envelope, validate_snapshot};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Validates `body` and stores it as a new snapshot of `endpoint`.
///
/// The snapshot, its child rows and the endpoint's liveness update commit
/// together or not at all. Returns the new snapshot id.
pub async fn ingest_snapshot(
    db: &DatabaseConnection,
    endpoint: endpoint::Model,
    body: Value,
) -> Result<i32, IngestError> {
    let document =
        unwrap_envelope(body).map_err(|e| IngestError::MalformedRequest(e.to_string()))?;
    validate_snapshot(&document)?;

    let payload = TelemetryPayload::from_document(&document)?;
    let header = payload.header()?;
    let endpoint_id = endpoint.id;

    let cpu = payload.cpu.clone().unwrap_or_default();
    let memory = payload.memory.clone().unwrap_or_default();

    let txn = db.begin().await?;

    let new_snapshot = snapshot::ActiveModel {
        endpoint_id: Set(endpoint_id),
        schema_version: Set(payload.schema_version.clone()),
        timestamp_utc: Set(header.observed_at),
        interval_seconds: Set(header.interval_seconds),
        cpu_utilization_pct: Set(cpu.utilization_pct),
        cpu_idle_pct: Set(cpu.idle_pct),
        mem_total_bytes: Set(memory.total_bytes),
        mem_used_bytes: Set(memory.used_bytes),
        mem_free_bytes: Set(memory.free_bytes),
        mem_used_pct: Set(memory.used_pct),
        users_count: Set(header.users_count),
        raw_payload: Set(Value::Object(document)),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    let snapshot_id = new_snapshot.id;

    if let Some(disk) = &payload.disk {
        let physical: Vec<disk_physical::ActiveModel> = disk
            .physical
            .iter()
            .map(|d| disk_physical::ActiveModel {
                snapshot_id: Set(snapshot_id),
                instance: Set(d.instance.clone()),
                reads_per_sec: Set(d.reads_per_sec),
                writes_per_sec: Set(d.writes_per_sec),
                avg_queue_length: Set(d.avg_queue_length),
                read_latency_ms: Set(d.read_latency_ms),
                write_latency_ms: Set(d.write_latency_ms),
                utilization_pct: Set(d.utilization_pct),
                ..Default::default()
            })
            .collect();
        if !physical.is_empty() {
            disk_physical::Entity::insert_many(physical).exec(&txn).await?;
        }

        let volumes: Vec<disk_volume::ActiveModel> = disk
            .volumes
            .iter()
            .map(|v| disk_volume::ActiveModel {
                snapshot_id: Set(snapshot_id),
                mount: Set(v.mount.clone()),
                filesystem: Set(v.filesystem.clone()),
                total_bytes: Set(v.total_bytes),
                free_bytes: Set(v.free_bytes),
                free_pct: Set(v.free_pct),
                ..Default::default()
            })
            .collect();
        if !volumes.is_empty() {
            disk_volume::Entity::insert_many(volumes).exec(&txn).await?;
        }
    }

    if let Some(network) = &payload.network {
        let interfaces: Vec<network_interface::ActiveModel> = network
            .interfaces
            .iter()
            .map(|n| network_interface::ActiveModel {
                snapshot_id: Set(snapshot_id),
                name: Set(n.name.clone()),
                bytes_total_per_sec: Set(n.bytes_total_per_sec),
                bits_total_per_sec: Set(n.bits_total_per_sec),
                utilization_pct: Set(n.utilization_pct),
                packets_in_errors: Set(n.packets_in_errors),
                packets_out_errors: Set(n.packets_out_errors),
                ..Default::default()
            })
            .collect();
        if !interfaces.is_empty() {
            network_interface::Entity::insert_many(interfaces)
                .exec(&txn)
                .await?;
        }
    }

    if let Some(users) = &payload.users {
        let sessions: Vec<logged_in_user::ActiveModel> = users
            .logged_in
            .iter()
            .map(|u| logged_in_user::ActiveModel {
                snapshot_id: Set(snapshot_id),
                username: Set(u.username.clone()),
                session_type: Set(u.session_type.clone()),
                ..Default::default()
            })
            .collect();
        if !sessions.is_empty() {
            logged_in_user::Entity::insert_many(sessions).exec(&txn).await?;
        }
    }

    // Last write wins: an older report still moves last_seen to its own time.
    let mut active_endpoint = endpoint.into_active_model();
    active_endpoint.last_seen = Set(Some(header.observed_at));
    active_endpoint.last_interval_seconds = Set(Some(header.interval_seconds));
    active_endpoint.hostname = Set(payload.host.hostname.clone());
    active_endpoint.machine_id = Set(payload.host.machine_id.clone());
    active_endpoint.update(&txn).await?;

    txn.commit().await?;

    debug!(endpoint_id, snapshot_id, observed_at = %header.observed_at, "Snapshot stored.");
    info!(endpoint_id, snapshot_id, "Telemetry ingested.");
    Ok(snapshot_id)
}
