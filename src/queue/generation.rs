//! Generation queue (spec.md §4.5): one row per `(repository, commit, sdk)`
//! artifact build, delegating the actual work to the SDK Builder (C6).

use std::path::Path;

use crate::db::MetadataStore;
use crate::db::entities::{JobStatus, generation_job, repository};
use crate::errors::RegistryError;
use crate::git::Workspace;
use crate::sdk::builder;

pub async fn process(
    store: &MetadataStore,
    workspace: &Workspace,
    sdk_root: &Path,
    job: generation_job::Model,
) -> Result<generation_job::Model, RegistryError> {
    let outcome = run(store, workspace, sdk_root, &job).await;
    finish(store, job, outcome).await
}

async fn run(
    store: &MetadataStore,
    workspace: &Workspace,
    sdk_root: &Path,
    job: &generation_job::Model,
) -> Result<(), RegistryError> {
    let repo: repository::Model = store.get_repository(job.repository_id).await?;
    builder::generate(
        workspace,
        sdk_root,
        &repo,
        &job.commit_hash,
        job.sdk,
    )
    .await?;
    Ok(())
}

async fn finish(
    store: &MetadataStore,
    job: generation_job::Model,
    outcome: Result<(), RegistryError>,
) -> Result<generation_job::Model, RegistryError> {
    let now = chrono::Utc::now();
    let mut am: generation_job::ActiveModel = job.into();
    match outcome {
        Ok(()) => {
            am.status = sea_orm::ActiveValue::Set(JobStatus::Completed);
            am.completed_at = sea_orm::ActiveValue::Set(Some(now));
            am.error_message = sea_orm::ActiveValue::Set(None);
        }
        Err(err) => apply_retry_or_fail(&mut am, &err),
    }
    store.save_generation_job(am).await
}

fn apply_retry_or_fail(am: &mut generation_job::ActiveModel, err: &RegistryError) {
    let attempts = match &am.attempts {
        sea_orm::ActiveValue::Set(v) | sea_orm::ActiveValue::Unchanged(v) => *v,
        sea_orm::ActiveValue::NotSet => 0,
    };
    let max_attempts = match &am.max_attempts {
        sea_orm::ActiveValue::Set(v) | sea_orm::ActiveValue::Unchanged(v) => *v,
        sea_orm::ActiveValue::NotSet => generation_job::MAX_ATTEMPTS,
    };
    am.error_message = sea_orm::ActiveValue::Set(Some(err.to_string()));
    if attempts >= max_attempts {
        am.status = sea_orm::ActiveValue::Set(JobStatus::Failed);
        am.completed_at = sea_orm::ActiveValue::Set(Some(chrono::Utc::now()));
    } else {
        am.status = sea_orm::ActiveValue::Set(JobStatus::Pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::sdk_preference::Sdk;
    use crate::db::schema;
    use sea_orm::Database;
    use uuid::Uuid;

    async fn store() -> MetadataStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        schema::create_all(&db).await.unwrap();
        MetadataStore::new(db)
    }

    #[tokio::test]
    async fn missing_repository_counts_as_a_failed_attempt() {
        let store = store().await;
        let workspace = Workspace::new(tempfile::tempdir().unwrap().path());
        let sdk_root = tempfile::tempdir().unwrap();
        let job = store
            .insert_generation_job(Uuid::new_v4(), "deadbeef".into(), Sdk::GoProtobuf)
            .await
            .unwrap();

        let processed = process(&store, &workspace, sdk_root.path(), job).await.unwrap();
        assert_eq!(processed.status, JobStatus::Pending);
        assert_eq!(processed.attempts, 1);
        assert!(processed.error_message.is_some());
    }

    #[tokio::test]
    async fn exhausting_max_attempts_transitions_to_failed() {
        let store = store().await;
        let workspace = Workspace::new(tempfile::tempdir().unwrap().path());
        let sdk_root = tempfile::tempdir().unwrap();
        let mut job = store
            .insert_generation_job(Uuid::new_v4(), "deadbeef".into(), Sdk::GoProtobuf)
            .await
            .unwrap();

        for _ in 0..generation_job::MAX_ATTEMPTS {
            let mut am: generation_job::ActiveModel = job.clone().into();
            am.attempts = sea_orm::ActiveValue::Set(job.attempts + 1);
            job = store.save_generation_job(am).await.unwrap();
        }

        let processed = process(&store, &workspace, sdk_root.path(), job).await.unwrap();
        assert_eq!(processed.status, JobStatus::Failed);
        assert!(processed.completed_at.is_some());
    }
}
