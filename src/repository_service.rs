//! Repository Service (C4, spec.md §4.4): the CRUD orchestrator that keeps
//! the Metadata Store (C1) and Git Workspace (C2) consistent, enforces the
//! Authorization Gate (C3), and emits trigger events into the Job Queue (C5).
//!
//! Rollback policy for compound filesystem+metadata operations: the
//! *earlier-committed* resource is the one kept on partial failure. Create
//! writes the filesystem first, metadata last, so a metadata failure rolls
//! the filesystem back. Delete soft-deletes metadata first, so a filesystem
//! failure leaves the metadata soft-deleted (the metadata row is always the
//! source of truth; an orphan directory is harmless and detectable).

use uuid::Uuid;

use crate::authz::{Gate, OrganizationDirectory};
use crate::db::entities::{repository, sdk_preference::Sdk};
use crate::db::MetadataStore;
use crate::errors::RegistryError;
use crate::git::{CommitInfo, FilePreview, TreeEntry, Workspace};
use crate::queue::trigger;

const MIN_PAGE_SIZE: u64 = 1;
const MAX_PAGE_SIZE: u64 = 100;
const DEFAULT_PAGE_SIZE: u64 = 10;

/// Clamp a caller-supplied page size into `[1, 100]`, defaulting to 10 when
/// unspecified/zero (spec.md §4.4, tested at the boundaries in §8).
pub fn clamp_page_size(requested: u64) -> u64 {
    if requested == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        requested.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

pub fn clamp_page(requested: u64) -> u64 {
    requested.max(1)
}

pub struct RepositoryPage {
    pub repositories: Vec<repository::Model>,
    pub next_page: u64,
    pub total_page: u64,
}

pub struct RepositoryWithPreferences {
    pub repository: repository::Model,
    pub sdk_preferences: Vec<(Sdk, bool)>,
}

pub struct CommitPage {
    pub commits: Vec<CommitInfo>,
    pub next_page: u64,
    pub total_page: u64,
}

pub struct RepositoryService<D: OrganizationDirectory> {
    store: MetadataStore,
    workspace: Workspace,
    gate: Gate<D>,
}

impl<D: OrganizationDirectory> RepositoryService<D> {
    pub fn new(store: MetadataStore, workspace: Workspace, gate: Gate<D>) -> Self {
        Self {
            store,
            workspace,
            gate,
        }
    }

    pub async fn create_repository(
        &self,
        name: String,
        organization_id: Uuid,
        created_by: Uuid,
        visibility: Option<repository::Visibility>,
    ) -> Result<repository::Model, RegistryError> {
        self.gate.require_owner(organization_id, created_by).await?;

        let id = Uuid::new_v4();
        let path = self.workspace.create_bare(id).await?;

        let now = chrono::Utc::now();
        let am = repository::ActiveModel {
            id: sea_orm::ActiveValue::Set(id),
            name: sea_orm::ActiveValue::Set(name),
            organization_id: sea_orm::ActiveValue::Set(organization_id),
            created_by: sea_orm::ActiveValue::Set(created_by),
            path: sea_orm::ActiveValue::Set(path.display().to_string()),
            visibility: sea_orm::ActiveValue::Set(visibility.unwrap_or_default()),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
            deleted_at: sea_orm::ActiveValue::Set(None),
        };

        match self.store.insert_repository(am).await {
            Ok(row) => Ok(row),
            Err(err) => {
                // Metadata is the later-committed resource; roll the
                // filesystem back on failure (spec.md §4.4 rollback policy).
                if let Err(cleanup_err) = self.workspace.remove(id).await {
                    tracing::error!(
                        repository_id = %id,
                        error = %cleanup_err,
                        "failed to roll back repository directory after metadata insert failure"
                    );
                }
                Err(err)
            }
        }
    }

    pub async fn get_repository(
        &self,
        id: Uuid,
        caller: Uuid,
    ) -> Result<RepositoryWithPreferences, RegistryError> {
        let repo = self.store.get_repository(id).await?;
        self.gate.require_member(repo.organization_id, caller).await?;
        let prefs = self.store.get_sdk_preferences(id).await?;
        Ok(RepositoryWithPreferences {
            repository: repo,
            sdk_preferences: prefs.into_iter().map(|p| (p.sdk, p.status)).collect(),
        })
    }

    /// GetCommits (spec.md §6): *Member*-gated, reverse-chronological commit
    /// page over the repository's bare Git tree.
    pub async fn get_commits(
        &self,
        id: Uuid,
        caller: Uuid,
        page: u64,
        page_size: u64,
    ) -> Result<CommitPage, RegistryError> {
        let repo = self.store.get_repository(id).await?;
        self.gate.require_member(repo.organization_id, caller).await?;

        let page = clamp_page(page);
        let page_size = clamp_page_size(page_size);
        let repo_path = std::path::Path::new(&repo.path);
        let (commits, total) = self.workspace.get_commits(repo_path, page, page_size).await?;
        let total_page = total.div_ceil(page_size).max(1);
        let next_page = if page < total_page { page + 1 } else { 0 };

        Ok(CommitPage {
            commits,
            next_page,
            total_page,
        })
    }

    /// GetRecentCommit (spec.md §6): *Member*-gated HEAD commit lookup.
    pub async fn get_recent_commit(
        &self,
        id: Uuid,
        caller: Uuid,
    ) -> Result<Option<CommitInfo>, RegistryError> {
        let repo = self.store.get_repository(id).await?;
        self.gate.require_member(repo.organization_id, caller).await?;

        let repo_path = std::path::Path::new(&repo.path);
        self.workspace.get_recent_commit(repo_path).await
    }

    /// GetFileTree (spec.md §6): *Member*-gated directory listing at HEAD.
    pub async fn get_file_tree(
        &self,
        id: Uuid,
        caller: Uuid,
        sub_path: Option<&str>,
    ) -> Result<Vec<TreeEntry>, RegistryError> {
        let repo = self.store.get_repository(id).await?;
        self.gate.require_member(repo.organization_id, caller).await?;

        let repo_path = std::path::Path::new(&repo.path);
        self.workspace.get_file_tree(repo_path, sub_path).await
    }

    /// GetFilePreview (spec.md §6): *Member*-gated file content + MIME at HEAD.
    pub async fn get_file_preview(
        &self,
        id: Uuid,
        caller: Uuid,
        file_path: &str,
    ) -> Result<FilePreview, RegistryError> {
        let repo = self.store.get_repository(id).await?;
        self.gate.require_member(repo.organization_id, caller).await?;

        let repo_path = std::path::Path::new(&repo.path);
        self.workspace.get_file_preview(repo_path, file_path).await
    }

    pub async fn get_repositories(
        &self,
        organization_id: Option<Uuid>,
        caller: Uuid,
        page: u64,
        page_size: u64,
    ) -> Result<RepositoryPage, RegistryError> {
        let page = clamp_page(page);
        let page_size = clamp_page_size(page_size);

        let org_ids: Vec<Uuid> = match organization_id {
            Some(org_id) => {
                self.gate.require_member(org_id, caller).await?;
                vec![org_id]
            }
            None => self.gate_member_organizations(caller).await?,
        };

        let (repositories, total) = self.store.list_repositories(Some(&org_ids), page, page_size).await?;
        let total_page = total.div_ceil(page_size).max(1);
        let next_page = if page < total_page { page + 1 } else { 0 };

        Ok(RepositoryPage {
            repositories,
            next_page,
            total_page,
        })
    }

    async fn gate_member_organizations(&self, caller: Uuid) -> Result<Vec<Uuid>, RegistryError> {
        // Delegated straight to the directory; `Gate` itself only exposes
        // per-organization checks, so this bypasses it deliberately.
        self.gate.member_organizations_of(caller).await
    }

    pub async fn update_repository(
        &self,
        id: Uuid,
        caller: Uuid,
        name: String,
        visibility: repository::Visibility,
    ) -> Result<(), RegistryError> {
        let repo = self.store.get_repository(id).await?;
        self.gate.require_owner(repo.organization_id, caller).await?;
        self.store.update_repository(id, name, visibility).await
    }

    pub async fn delete_repository(&self, id: Uuid, caller: Uuid) -> Result<(), RegistryError> {
        let repo = self.store.get_repository(id).await?;
        self.gate.require_owner(repo.organization_id, caller).await?;

        // Metadata is the earlier-committed resource for delete: soft-delete
        // first, then remove the directory. A filesystem failure leaves the
        // metadata soft-deleted (spec.md §4.4).
        self.store.soft_delete_repository(id).await?;
        self.workspace.remove(id).await
    }

    pub async fn delete_repositories_by_organization(
        &self,
        organization_id: Uuid,
        caller: Uuid,
    ) -> Result<(), RegistryError> {
        self.gate.require_owner(organization_id, caller).await?;

        let deleted = self
            .store
            .soft_delete_repositories_by_organization(organization_id)
            .await?;

        let removals = futures::future::join_all(
            deleted.iter().map(|repo| self.workspace.remove(repo.id)),
        )
        .await;

        for result in removals {
            result?;
        }
        Ok(())
    }

    pub async fn update_sdk_preferences(
        &self,
        id: Uuid,
        caller: Uuid,
        preferences: Vec<(Sdk, bool)>,
    ) -> Result<(), RegistryError> {
        let repo = self.store.get_repository(id).await?;
        self.gate.require_owner(repo.organization_id, caller).await?;

        self.store.replace_sdk_preferences(id, preferences).await?;

        if let Err(err) = trigger::enqueue(&self.store, repo.id, repo.path.clone()).await {
            // Logged, not propagated (spec.md §4.4): the preference write is
            // the user-visible effect.
            tracing::error!(
                repository_id = %id,
                error = %err,
                "failed to enqueue trigger job after sdk preference update"
            );
        }
        Ok(())
    }
}
