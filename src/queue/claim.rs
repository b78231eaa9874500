//! Claim protocol (spec.md §4.5): "a worker polls up to batchSize rows in
//! pending or in processing whose ProcessedAt is older than a stuck-worker
//! timeout, and atomically flips them to processing + bumps Attempts + sets
//! ProcessedAt = now." On Postgres this is `SELECT ... FOR UPDATE SKIP
//! LOCKED`; sea-orm's sqlite backend has no `SKIP LOCKED` support, so the
//! same effect is approximated there with a plain transaction — fine for the
//! single-process test/dev use this crate targets, not a substitute for
//! Postgres in a multi-worker deployment (documented as a test-only fallback
//! in the design notes).

use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseBackend, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use sea_orm::{LockBehavior, LockType};

use crate::db::MetadataStore;
use crate::db::entities::{JobStatus, generation_job, trigger_job};
use crate::errors::RegistryError;

async fn begin_for_claim(
    store: &MetadataStore,
) -> Result<DatabaseTransaction, RegistryError> {
    Ok(store.connection().begin().await?)
}

pub async fn claim_trigger_jobs(
    store: &MetadataStore,
    batch_size: u64,
    stuck_timeout: ChronoDuration,
) -> Result<Vec<trigger_job::Model>, RegistryError> {
    let cutoff = Utc::now() - stuck_timeout;
    let txn = begin_for_claim(store).await?;
    let backend = txn.get_database_backend();

    let mut query = trigger_job::Entity::find()
        .filter(
            Condition::any()
                .add(trigger_job::Column::Status.eq(JobStatus::Pending))
                .add(
                    Condition::all()
                        .add(trigger_job::Column::Status.eq(JobStatus::Processing))
                        .add(trigger_job::Column::ProcessedAt.lt(cutoff)),
                ),
        )
        .order_by_asc(trigger_job::Column::CreatedAt)
        .limit(batch_size);

    if backend == DatabaseBackend::Postgres {
        query = query.lock_with_behavior(LockType::Update, LockBehavior::SkipLocked);
    }

    let candidates = query.all(&txn).await?;
    let now = Utc::now();
    let mut claimed = Vec::with_capacity(candidates.len());
    for row in candidates {
        let next_attempts = row.attempts + 1;
        let mut am: trigger_job::ActiveModel = row.into();
        am.status = sea_orm::ActiveValue::Set(JobStatus::Processing);
        am.attempts = sea_orm::ActiveValue::Set(next_attempts);
        am.processed_at = sea_orm::ActiveValue::Set(Some(now));
        claimed.push(am.update(&txn).await?);
    }
    txn.commit().await?;
    Ok(claimed)
}

pub async fn claim_generation_jobs(
    store: &MetadataStore,
    batch_size: u64,
    stuck_timeout: ChronoDuration,
) -> Result<Vec<generation_job::Model>, RegistryError> {
    let cutoff = Utc::now() - stuck_timeout;
    let txn = begin_for_claim(store).await?;
    let backend = txn.get_database_backend();

    let mut query = generation_job::Entity::find()
        .filter(
            Condition::any()
                .add(generation_job::Column::Status.eq(JobStatus::Pending))
                .add(
                    Condition::all()
                        .add(generation_job::Column::Status.eq(JobStatus::Processing))
                        .add(generation_job::Column::ProcessedAt.lt(cutoff)),
                ),
        )
        .order_by_asc(generation_job::Column::CreatedAt)
        .limit(batch_size);

    if backend == DatabaseBackend::Postgres {
        query = query.lock_with_behavior(LockType::Update, LockBehavior::SkipLocked);
    }

    let candidates = query.all(&txn).await?;
    let now = Utc::now();
    let mut claimed = Vec::with_capacity(candidates.len());
    for row in candidates {
        let next_attempts = row.attempts + 1;
        let mut am: generation_job::ActiveModel = row.into();
        am.status = sea_orm::ActiveValue::Set(JobStatus::Processing);
        am.attempts = sea_orm::ActiveValue::Set(next_attempts);
        am.processed_at = sea_orm::ActiveValue::Set(Some(now));
        claimed.push(am.update(&txn).await?);
    }
    txn.commit().await?;
    Ok(claimed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use sea_orm::Database;

    async fn store() -> MetadataStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        schema::create_all(&db).await.unwrap();
        MetadataStore::new(db)
    }

    #[tokio::test]
    async fn claims_pending_and_bumps_attempts() {
        let store = store().await;
        let repo_id = uuid::Uuid::new_v4();
        store
            .insert_trigger_job(repo_id, "./repos/x".into())
            .await
            .unwrap();

        let claimed = claim_trigger_jobs(&store, 10, ChronoDuration::seconds(900))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, JobStatus::Processing);
        assert_eq!(claimed[0].attempts, 1);

        // A second claim immediately after sees nothing: the row is now
        // `processing` with a fresh `processed_at`, inside the stuck window.
        let claimed_again = claim_trigger_jobs(&store, 10, ChronoDuration::seconds(900))
            .await
            .unwrap();
        assert!(claimed_again.is_empty());
    }

    #[tokio::test]
    async fn reclaims_stuck_processing_rows() {
        let store = store().await;
        let repo_id = uuid::Uuid::new_v4();
        let job = store
            .insert_trigger_job(repo_id, "./repos/x".into())
            .await
            .unwrap();

        let mut am: trigger_job::ActiveModel = job.into();
        am.status = sea_orm::ActiveValue::Set(JobStatus::Processing);
        am.processed_at = sea_orm::ActiveValue::Set(Some(Utc::now() - ChronoDuration::hours(1)));
        store.save_trigger_job(am).await.unwrap();

        let claimed = claim_trigger_jobs(&store, 10, ChronoDuration::seconds(900))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempts, 1);
    }
}
