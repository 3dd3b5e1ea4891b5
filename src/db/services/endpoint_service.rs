use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, Set,
};
use tokio::task;
use tracing::{debug, info};

use crate::db::entities::endpoint;
use crate::services::credential_service::{self, TokenHashError};

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error(transparent)]
    TokenHash(#[from] TokenHashError),
    #[error("Endpoint {0} not found")]
    NotFound(i32),
    #[error("Token verification task failed: {0}")]
    Verification(#[from] task::JoinError),
}

/// Registers a new endpoint with a freshly generated token.
///
/// The plaintext token is returned here and nowhere else; only its hash is stored.
pub async fn register_endpoint<C>(
    db: &C,
    hostname: &str,
    machine_id: &str,
) -> Result<(endpoint::Model, String), EndpointError>
where
    C: ConnectionTrait,
{
    let token = credential_service::generate_token();
    let token_hash = credential_service::hash_token(&token)?;

    let model = endpoint::ActiveModel {
        hostname: Set(hostname.to_owned()),
        machine_id: Set(machine_id.to_owned()),
        token_hash: Set(token_hash),
        is_active: Set(true),
        last_seen: Set(None),
        last_interval_seconds: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(endpoint_id = model.id, hostname = %model.hostname, "Endpoint registered.");
    Ok((model, token))
}

/// Marks an endpoint inactive. Its history is kept.
pub async fn deactivate_endpoint<C>(db: &C, endpoint_id: i32) -> Result<endpoint::Model, EndpointError>
where
    C: ConnectionTrait,
{
    let existing = endpoint::Entity::find_by_id(endpoint_id)
        .one(db)
        .await?
        .ok_or(EndpointError::NotFound(endpoint_id))?;

    let mut active = existing.into_active_model();
    active.is_active = Set(false);
    let updated = active.update(db).await?;

    info!(endpoint_id, "Endpoint deactivated.");
    Ok(updated)
}

/// Finds the active endpoint whose stored hash matches `token`.
///
/// Every active endpoint is checked in turn because salted hashes cannot be
/// looked up by equality. The bcrypt scan runs on the blocking pool. Returns
/// `None` for unknown and inactive tokens alike.
pub async fn resolve_endpoint<C>(
    db: &C,
    token: &str,
) -> Result<Option<endpoint::Model>, EndpointError>
where
    C: ConnectionTrait,
{
    let candidates = endpoint::Entity::find()
        .filter(endpoint::Column::IsActive.eq(true))
        .all(db)
        .await?;

    let token = token.to_owned();
    let found = task::spawn_blocking(move || {
        candidates
            .into_iter()
            .find(|candidate| credential_service::verify_token(&token, &candidate.token_hash))
    })
    .await?;

    if found.is_none() {
        debug!("No active endpoint matched the presented token.");
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_db;

    #[tokio::test]
    async fn register_stores_only_the_hash() {
        let db = memory_db().await;
        let (endpoint, token) = register_endpoint(&db, "web-01", "m-01").await.unwrap();

        assert!(endpoint.is_active);
        assert_ne!(endpoint.token_hash, token);
        assert!(credential_service::verify_token(&token, &endpoint.token_hash));
        assert_eq!(endpoint.last_seen, None);
    }

    #[tokio::test]
    async fn resolve_matches_the_right_endpoint() {
        let db = memory_db().await;
        let (first, first_token) = register_endpoint(&db, "web-01", "m-01").await.unwrap();
        let (second, second_token) = register_endpoint(&db, "web-02", "m-02").await.unwrap();

        let found = resolve_endpoint(&db, &second_token).await.unwrap().unwrap();
        assert_eq!(found.id, second.id);
        let found = resolve_endpoint(&db, &first_token).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);

        assert!(resolve_endpoint(&db, "unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deactivated_endpoint_no_longer_resolves() {
        let db = memory_db().await;
        let (endpoint, token) = register_endpoint(&db, "web-01", "m-01").await.unwrap();

        let updated = deactivate_endpoint(&db, endpoint.id).await.unwrap();
        assert!(!updated.is_active);
        assert!(resolve_endpoint(&db, &token).await.unwrap().is_none());
        assert!(endpoint::Entity::find_by_id(endpoint.id).one(&db).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_resolves_each_find_their_endpoint() {
        let db = memory_db().await;
        let mut registered = Vec::new();
        for i in 0..4 {
            let pair = register_endpoint(&db, &format!("web-{i}"), &format!("m-{i}"))
                .await
                .unwrap();
            registered.push(pair);
        }

        let lookups = registered.iter().map(|(_, token)| resolve_endpoint(&db, token));
        let found = futures::future::join_all(lookups).await;

        for ((expected, _), result) in registered.iter().zip(found) {
            assert_eq!(result.unwrap().map(|e| e.id), Some(expected.id));
        }
    }

    #[tokio::test]
    async fn deactivating_unknown_endpoint_fails() {
        let db = memory_db().await;
        let err = deactivate_endpoint(&db, 99).await.unwrap_err();
        assert!(matches!(err, EndpointError::NotFound(99)));
    }
}
