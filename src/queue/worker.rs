//! Queue worker lifecycle (spec.md §4.5, §5): `Start`/`Stop` around a
//! polling loop on `tokio::time::interval`. Cancellation is cooperative: a
//! hand-rolled atomic flag rather than `tokio_util::CancellationToken` — the
//! teacher crate has no cancellation-token dependency and this crate's only
//! use is a single bool check per tick, not worth the extra dependency
//! (recorded in the design notes as a deliberate non-addition).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::db::MetadataStore;
use crate::git::Workspace;
use crate::queue::{claim, generation, trigger};

pub struct Worker {
    store: MetadataStore,
    workspace: Workspace,
    sdk_root: PathBuf,
    config: QueueConfig,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(
        store: MetadataStore,
        workspace: Workspace,
        sdk_root: PathBuf,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            workspace,
            sdk_root,
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Launch the polling loop as a background task. A second call while
    /// already running is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        self.stop_flag.store(false, Ordering::SeqCst);

        let store = self.store.clone();
        let workspace = self.workspace.clone();
        let sdk_root = self.sdk_root.clone();
        let config = self.config.clone();
        let stop_flag = self.stop_flag.clone();

        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.poll_interval());
            loop {
                interval.tick().await;
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = run_one_tick(&store, &workspace, &sdk_root, &config).await {
                    tracing::error!(error = %err, "queue tick failed");
                }
            }
        }));
    }

    /// Signal cancellation and wait for the in-flight tick to drain. A
    /// stopped worker leaves any currently `processing` rows exactly as they
    /// are; another worker reclaims them after the stuck-worker timeout.
    pub async fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn run_one_tick(
    store: &MetadataStore,
    workspace: &Workspace,
    sdk_root: &std::path::Path,
    config: &QueueConfig,
) -> Result<(), crate::errors::RegistryError> {
    let stuck_timeout = config.stuck_timeout();

    let trigger_jobs = claim::claim_trigger_jobs(store, config.batch_size, stuck_timeout).await?;
    for job in trigger_jobs {
        if let Err(err) = trigger::process(store, workspace, job).await {
            tracing::error!(error = %err, "trigger job processing failed");
        }
    }

    let generation_jobs =
        claim::claim_generation_jobs(store, config.batch_size, stuck_timeout).await?;
    for job in generation_jobs {
        if let Err(err) = generation::process(store, workspace, sdk_root, job).await {
            tracing::error!(error = %err, "generation job processing failed");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use sea_orm::Database;
    use tracing_subscriber::util::SubscriberInitExt;
    use uuid::Uuid;

    /// Surfaces the worker's `tracing::error!` calls during a test run; harmless
    /// to call more than once since the guard is simply dropped at scope exit.
    fn init_logger() -> tracing::subscriber::DefaultGuard {
        tracing_subscriber::fmt::Subscriber::builder()
            .with_target(false)
            .without_time()
            .with_test_writer()
            .finish()
            .set_default()
    }

    #[tokio::test]
    async fn start_then_stop_is_idempotent_and_clean() {
        let _guard = init_logger();
        let db = Database::connect("sqlite::memory:").await.unwrap();
        schema::create_all(&db).await.unwrap();
        let store = MetadataStore::new(db);
        let workspace = Workspace::new(tempfile::tempdir().unwrap().path());
        let sdk_root = tempfile::tempdir().unwrap();

        let mut config = QueueConfig::default();
        config.poll_interval_secs = 0;
        let mut worker = Worker::new(store, workspace, sdk_root.path().to_path_buf(), config);

        worker.start();
        worker.start();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        worker.stop().await;
    }

    #[tokio::test]
    async fn tick_claims_and_completes_an_empty_trigger_job() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        schema::create_all(&db).await.unwrap();
        let store = MetadataStore::new(db);
        let workspace = Workspace::new(tempfile::tempdir().unwrap().path());
        let sdk_root = tempfile::tempdir().unwrap();

        store
            .insert_trigger_job(Uuid::new_v4(), "./repos/unused".into())
            .await
            .unwrap();

        let config = QueueConfig::default();
        run_one_tick(&store, &workspace, sdk_root.path(), &config)
            .await
            .unwrap();

        let jobs = store.generation_jobs_for_trigger(Uuid::new_v4()).await.unwrap();
        assert!(jobs.is_empty());
    }
}
