//! Metadata Store (C1): durable persistence for Repository, SdkPreference,
//! TriggerJob and GenerationJob rows (spec.md §4.1).
//!
//! All reads of soft-deletable rows filter `deleted_at IS NULL`. A zero-row
//! update on a by-id mutation surfaces as `NotFound`; a unique-key violation
//! on insert surfaces as `AlreadyExists`, distinguished from a generic
//! `Internal` by matching on the database error text (sea-orm does not
//! expose a portable "this was a unique violation" code across the sqlite
//! and postgres backends this crate supports).

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use uuid::Uuid;

use crate::db::entities::{
    generation_job, job_status::JobStatus, repository, sdk_preference, sdk_preference::Sdk,
    trigger_job,
};
use crate::errors::RegistryError;

#[derive(Clone)]
pub struct MetadataStore {
    db: DatabaseConnection,
}

fn is_unique_violation(err: &DbErr) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("unique") || msg.contains("duplicate key")
}

impl MetadataStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // ---- Repository -----------------------------------------------------

    pub async fn insert_repository(
        &self,
        am: repository::ActiveModel,
    ) -> Result<repository::Model, RegistryError> {
        am.insert(&self.db).await.map_err(|err| {
            if is_unique_violation(&err) {
                RegistryError::already_exists("repository already exists")
            } else {
                RegistryError::Database(err)
            }
        })
    }

    pub async fn get_repository(&self, id: Uuid) -> Result<repository::Model, RegistryError> {
        repository::Entity::find_by_id(id)
            .filter(repository::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("repository {id}")))
    }

    /// Paginated listing, filtered by organization when given. Returns the
    /// page plus the exact total row count, taken via a second query in the
    /// same call (consumers tolerate the documented skew, spec.md §4.1).
    pub async fn list_repositories(
        &self,
        organization_ids: Option<&[Uuid]>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<repository::Model>, u64), RegistryError> {
        let mut query = repository::Entity::find()
            .filter(repository::Column::DeletedAt.is_null())
            .order_by_desc(repository::Column::CreatedAt);

        if let Some(ids) = organization_ids {
            query = query.filter(repository::Column::OrganizationId.is_in(ids.to_vec()));
        }

        let paginator = query.paginate(&self.db, page_size);
        let total = paginator.num_items().await?;
        // sea-orm pages are 0-indexed; callers here use 1-indexed pages.
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }

    pub async fn update_repository(
        &self,
        id: Uuid,
        name: String,
        visibility: repository::Visibility,
    ) -> Result<(), RegistryError> {
        let existing = self.get_repository(id).await?;
        let mut am: repository::ActiveModel = existing.into();
        am.name = Set(name);
        am.visibility = Set(visibility);
        am.updated_at = Set(Utc::now());
        am.update(&self.db).await?;
        Ok(())
    }

    pub async fn soft_delete_repository(&self, id: Uuid) -> Result<(), RegistryError> {
        let existing = self.get_repository(id).await?;
        let mut am: repository::ActiveModel = existing.into();
        am.deleted_at = Set(Some(Utc::now()));
        am.updated_at = Set(Utc::now());
        am.update(&self.db).await?;
        Ok(())
    }

    pub async fn soft_delete_repositories_by_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<repository::Model>, RegistryError> {
        let (rows, _) = self
            .list_repositories(Some(&[organization_id]), 1, u64::MAX)
            .await?;
        let mut deleted = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            self.soft_delete_repository(id).await?;
            deleted.push(row);
        }
        Ok(deleted)
    }

    // ---- SdkPreference ----------------------------------------------------

    /// Atomically replace the full preference set for a repository.
    pub async fn replace_sdk_preferences(
        &self,
        repository_id: Uuid,
        preferences: Vec<(Sdk, bool)>,
    ) -> Result<(), RegistryError> {
        let txn = self.db.begin().await?;

        sdk_preference::Entity::delete_many()
            .filter(sdk_preference::Column::RepositoryId.eq(repository_id))
            .exec(&txn)
            .await?;

        for (sdk, status) in preferences {
            let am = sdk_preference::ActiveModel {
                id: Default::default(),
                repository_id: Set(repository_id),
                sdk: Set(sdk),
                status: Set(status),
            };
            am.insert(&txn).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    pub async fn get_sdk_preferences(
        &self,
        repository_id: Uuid,
    ) -> Result<Vec<sdk_preference::Model>, RegistryError> {
        Ok(sdk_preference::Entity::find()
            .filter(sdk_preference::Column::RepositoryId.eq(repository_id))
            .all(&self.db)
            .await?)
    }

    pub async fn enabled_sdks(&self, repository_id: Uuid) -> Result<Vec<Sdk>, RegistryError> {
        Ok(self
            .get_sdk_preferences(repository_id)
            .await?
            .into_iter()
            .filter(|p| p.status)
            .map(|p| p.sdk)
            .collect())
    }

    // ---- TriggerJob -------------------------------------------------------

    pub async fn insert_trigger_job(
        &self,
        repository_id: Uuid,
        repo_path: String,
    ) -> Result<trigger_job::Model, RegistryError> {
        let now = Utc::now();
        let am = trigger_job::ActiveModel {
            id: Set(Uuid::now_v7()),
            repository_id: Set(repository_id),
            repo_path: Set(repo_path),
            status: Set(JobStatus::Pending),
            attempts: Set(0),
            max_attempts: Set(trigger_job::MAX_ATTEMPTS),
            created_at: Set(now),
            processed_at: Set(None),
            completed_at: Set(None),
            error_message: Set(None),
        };
        Ok(am.insert(&self.db).await?)
    }

    pub async fn get_trigger_job(&self, id: Uuid) -> Result<trigger_job::Model, RegistryError> {
        trigger_job::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("trigger job {id}")))
    }

    pub async fn save_trigger_job(
        &self,
        am: trigger_job::ActiveModel,
    ) -> Result<trigger_job::Model, RegistryError> {
        Ok(am.update(&self.db).await?)
    }

    // ---- GenerationJob ------------------------------------------------------

    pub async fn insert_generation_job(
        &self,
        repository_id: Uuid,
        commit_hash: String,
        sdk: Sdk,
    ) -> Result<generation_job::Model, RegistryError> {
        let now = Utc::now();
        let am = generation_job::ActiveModel {
            id: Set(Uuid::now_v7()),
            repository_id: Set(repository_id),
            commit_hash: Set(commit_hash),
            sdk: Set(sdk),
            status: Set(JobStatus::Pending),
            attempts: Set(0),
            max_attempts: Set(generation_job::MAX_ATTEMPTS),
            created_at: Set(now),
            processed_at: Set(None),
            completed_at: Set(None),
            error_message: Set(None),
        };
        Ok(am.insert(&self.db).await?)
    }

    /// True if a non-terminal row already exists for this tuple (the
    /// invariant of spec.md §3 that the worker's claim step enforces).
    pub async fn has_non_terminal_generation_job(
        &self,
        repository_id: Uuid,
        commit_hash: &str,
        sdk: Sdk,
    ) -> Result<bool, RegistryError> {
        let count = generation_job::Entity::find()
            .filter(generation_job::Column::RepositoryId.eq(repository_id))
            .filter(generation_job::Column::CommitHash.eq(commit_hash))
            .filter(generation_job::Column::Sdk.eq(sdk))
            .filter(
                generation_job::Column::Status
                    .is_in([JobStatus::Pending, JobStatus::Processing]),
            )
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    pub async fn get_generation_job(
        &self,
        id: Uuid,
    ) -> Result<generation_job::Model, RegistryError> {
        generation_job::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("generation job {id}")))
    }

    pub async fn save_generation_job(
        &self,
        am: generation_job::ActiveModel,
    ) -> Result<generation_job::Model, RegistryError> {
        Ok(am.update(&self.db).await?)
    }

    pub async fn generation_jobs_for_trigger(
        &self,
        repository_id: Uuid,
    ) -> Result<Vec<generation_job::Model>, RegistryError> {
        Ok(generation_job::Entity::find()
            .filter(generation_job::Column::RepositoryId.eq(repository_id))
            .all(&self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use sea_orm::Database;

    async fn test_store() -> MetadataStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        schema::create_all(&db).await.unwrap();
        MetadataStore::new(db)
    }

    fn sample_repo(org: Uuid, user: Uuid) -> repository::ActiveModel {
        let id = Uuid::new_v4();
        let now = Utc::now();
        repository::ActiveModel {
            id: Set(id),
            name: Set("svc-a".into()),
            organization_id: Set(org),
            created_by: Set(user),
            path: Set(format!("./repos/{id}")),
            visibility: Set(repository::Visibility::Public),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = test_store().await;
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        let inserted = store.insert_repository(sample_repo(org, user)).await.unwrap();

        let fetched = store.get_repository(inserted.id).await.unwrap();
        assert_eq!(fetched.name, "svc-a");
        assert_eq!(fetched.organization_id, org);
        assert_eq!(fetched.visibility, repository::Visibility::Public);
    }

    #[tokio::test]
    async fn create_then_delete_then_get_is_not_found() {
        let store = test_store().await;
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        let inserted = store.insert_repository(sample_repo(org, user)).await.unwrap();

        store.soft_delete_repository(inserted.id).await.unwrap();
        let err = store.get_repository(inserted.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_id_insert_is_already_exists() {
        let store = test_store().await;
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        let am = sample_repo(org, user);
        let id = match &am.id {
            sea_orm::ActiveValue::Set(v) => *v,
            _ => unreachable!(),
        };
        store.insert_repository(am).await.unwrap();

        let mut dup = sample_repo(org, user);
        dup.id = Set(id);
        let err = store.insert_repository(dup).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn replace_sdk_preferences_is_atomic_replacement() {
        let store = test_store().await;
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        let repo = store.insert_repository(sample_repo(org, user)).await.unwrap();

        store
            .replace_sdk_preferences(repo.id, vec![(Sdk::GoProtobuf, true), (Sdk::JsProtobuf, false)])
            .await
            .unwrap();
        let prefs = store.get_sdk_preferences(repo.id).await.unwrap();
        assert_eq!(prefs.len(), 2);

        store
            .replace_sdk_preferences(repo.id, vec![(Sdk::JsConnectRpc, true)])
            .await
            .unwrap();
        let prefs = store.get_sdk_preferences(repo.id).await.unwrap();
        assert_eq!(prefs.len(), 1);
        assert_eq!(prefs[0].sdk, Sdk::JsConnectRpc);
    }

    #[tokio::test]
    async fn page_limit_boundaries() {
        let store = test_store().await;
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        for _ in 0..3 {
            store.insert_repository(sample_repo(org, user)).await.unwrap();
        }
        let (rows, total) = store.list_repositories(Some(&[org]), 1, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(total, 3);
    }
}
