//! Trigger queue (spec.md §4.5): one row per push/preference-change event,
//! expanded into zero or more GenerationJobs.

use std::path::Path;
use uuid::Uuid;

use crate::db::MetadataStore;
use crate::db::entities::{JobStatus, trigger_job};
use crate::errors::RegistryError;
use crate::git::Workspace;

/// Bound on commits walked per trigger, matching spec.md §4.5's "bounded
/// page size, e.g., 10 000".
const MAX_COMMITS_PER_TRIGGER: u64 = 10_000;

pub async fn enqueue(
    store: &MetadataStore,
    repository_id: Uuid,
    repo_path: String,
) -> Result<trigger_job::Model, RegistryError> {
    store.insert_trigger_job(repository_id, repo_path).await
}

/// `ProcessSdkTrigger(repoId, repoPath)` (spec.md §4.5): read all enabled
/// SdkPreferences, list all commits of the bare repo, emit one GenerationJob
/// per (commit, enabled-SDK). An empty set short-circuits to `completed`.
pub async fn process(
    store: &MetadataStore,
    workspace: &Workspace,
    job: trigger_job::Model,
) -> Result<trigger_job::Model, RegistryError> {
    let outcome = run(store, workspace, &job).await;
    finish(store, job, outcome).await
}

async fn run(
    store: &MetadataStore,
    workspace: &Workspace,
    job: &trigger_job::Model,
) -> Result<(), RegistryError> {
    let enabled_sdks = store.enabled_sdks(job.repository_id).await?;
    if enabled_sdks.is_empty() {
        return Ok(());
    }

    let repo_path = Path::new(&job.repo_path);
    let (commits, _total) = workspace
        .get_commits(repo_path, 1, MAX_COMMITS_PER_TRIGGER)
        .await?;

    for commit in commits {
        for sdk in &enabled_sdks {
            if store
                .has_non_terminal_generation_job(job.repository_id, &commit.hash, *sdk)
                .await?
            {
                continue;
            }
            store
                .insert_generation_job(job.repository_id, commit.hash.clone(), *sdk)
                .await?;
        }
    }
    Ok(())
}

async fn finish(
    store: &MetadataStore,
    job: trigger_job::Model,
    outcome: Result<(), RegistryError>,
) -> Result<trigger_job::Model, RegistryError> {
    let now = chrono::Utc::now();
    let mut am: trigger_job::ActiveModel = job.into();
    match outcome {
        Ok(()) => {
            am.status = sea_orm::ActiveValue::Set(JobStatus::Completed);
            am.completed_at = sea_orm::ActiveValue::Set(Some(now));
            am.error_message = sea_orm::ActiveValue::Set(None);
        }
        Err(err) => {
            apply_retry_or_fail(&mut am, &err);
        }
    }
    store.save_trigger_job(am).await
}

fn apply_retry_or_fail(am: &mut trigger_job::ActiveModel, err: &RegistryError) {
    let attempts = match &am.attempts {
        sea_orm::ActiveValue::Set(v) | sea_orm::ActiveValue::Unchanged(v) => *v,
        sea_orm::ActiveValue::NotSet => 0,
    };
    let max_attempts = match &am.max_attempts {
        sea_orm::ActiveValue::Set(v) | sea_orm::ActiveValue::Unchanged(v) => *v,
        sea_orm::ActiveValue::NotSet => trigger_job::MAX_ATTEMPTS,
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
    use std::process::Command;

    async fn store() -> MetadataStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        schema::create_all(&db).await.unwrap();
        MetadataStore::new(db)
    }

    fn init_repo_with_one_commit(dir: &std::path::Path) {
        let run = |args: &[&str]| {
            assert!(Command::new("git").args(args).current_dir(dir).status().unwrap().success());
        };
        run(&["init", "--quiet"]);
        run(&["config", "user.email", "t@example.com"]);
        run(&["config", "user.name", "t"]);
        std::fs::write(dir.join("a.proto"), "syntax = \"proto3\";").unwrap();
        run(&["add", "-A"]);
        run(&["commit", "--quiet", "-m", "initial"]);
    }

    #[tokio::test]
    async fn empty_preferences_short_circuit_to_completed() {
        let store = store().await;
        let workspace = Workspace::new(tempfile::tempdir().unwrap().path());
        let repo_id = Uuid::new_v4();
        let job = store
            .insert_trigger_job(repo_id, "./repos/unused".into())
            .await
            .unwrap();

        let processed = process(&store, &workspace, job).await.unwrap();
        assert_eq!(processed.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn enabled_sdk_emits_one_generation_job_per_commit() {
        let store = store().await;
        let tmp = tempfile::tempdir().unwrap();
        init_repo_with_one_commit(tmp.path());
        let workspace = Workspace::new(tmp.path().parent().unwrap());
        let repo_id = Uuid::new_v4();

        store
            .replace_sdk_preferences(repo_id, vec![(Sdk::GoProtobuf, true), (Sdk::JsProtobuf, false)])
            .await
            .unwrap();

        let job = store
            .insert_trigger_job(repo_id, tmp.path().display().to_string())
            .await
            .unwrap();
        let processed = process(&store, &workspace, job).await.unwrap();
        assert_eq!(processed.status, JobStatus::Completed);

        let jobs = store.generation_jobs_for_trigger(repo_id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].sdk, Sdk::GoProtobuf);
    }
}
