//! Authorization Gate (C3, spec.md §4.3).
//!
//! A pure policy layer: given an authenticated user and a repository's
//! organization, decide whether the user may perform the requested action.
//! `OrganizationDirectory` is the out-of-scope "organization/membership
//! store" collaborator from spec.md §1 — this crate only depends on its
//! single capability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Reader,
    Author,
    Owner,
}

/// The organization/membership store's single exposed capability (spec.md
/// §1, §4.3): "return a member's role within an organization."
#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    /// `Err(RegistryError::PermissionDenied)` when the user is not a member
    /// at all; `Ok(role)` otherwise.
    async fn member_role(&self, org_id: Uuid, user_id: Uuid) -> Result<Role, RegistryError>;

    /// Organizations the user belongs to, in any role. Not part of the
    /// single-capability collaborator spec.md §1/§4.3 describes, but
    /// `GetRepositories` with no `organizationId` (spec.md §4.4) needs it —
    /// recorded as a deliberate extension in the design notes rather than
    /// left unimplementable.
    async fn member_organizations(&self, user_id: Uuid) -> Result<Vec<Uuid>, RegistryError>;
}

const NOT_A_MEMBER: &str = "you are not a member of this organization";
const OWNERS_ONLY: &str = "only organization owners can perform this operation";

/// Wraps an `OrganizationDirectory` and exposes the policy predicates and
/// gate checks spec.md §4.3 maps onto each operation.
pub struct Gate<D: OrganizationDirectory> {
    directory: D,
}

impl<D: OrganizationDirectory> Gate<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    async fn role(&self, org_id: Uuid, user_id: Uuid) -> Result<Role, RegistryError> {
        match self.directory.member_role(org_id, user_id).await {
            Ok(role) => Ok(role),
            Err(_) => Err(RegistryError::permission_denied(NOT_A_MEMBER)),
        }
    }

    pub async fn is_member(&self, org_id: Uuid, user_id: Uuid) -> bool {
        self.role(org_id, user_id).await.is_ok()
    }

    pub async fn is_owner(&self, org_id: Uuid, user_id: Uuid) -> bool {
        matches!(self.role(org_id, user_id).await, Ok(Role::Owner))
    }

    /// Create, Update, Delete Repository and UpdateSdkPreferences.
    pub async fn require_owner(&self, org_id: Uuid, user_id: Uuid) -> Result<(), RegistryError> {
        match self.role(org_id, user_id).await? {
            Role::Owner => Ok(()),
            _ => Err(RegistryError::permission_denied(OWNERS_ONLY)),
        }
    }

    /// GetRepository/GetRepositories/GetCommits/GetFileTree/GetFilePreview,
    /// and SSH read (`git-upload-pack`).
    pub async fn require_member(&self, org_id: Uuid, user_id: Uuid) -> Result<(), RegistryError> {
        self.role(org_id, user_id).await.map(|_| ())
    }

    /// SSH write (`git-receive-pack`): Owner or Author.
    pub async fn require_owner_or_author(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), RegistryError> {
        match self.role(org_id, user_id).await? {
            Role::Owner | Role::Author => Ok(()),
            Role::Reader => Err(RegistryError::permission_denied(OWNERS_ONLY)),
        }
    }

    /// Organizations the user belongs to, for `GetRepositories` with no
    /// `organizationId` (spec.md §4.4).
    pub async fn member_organizations_of(&self, user_id: Uuid) -> Result<Vec<Uuid>, RegistryError> {
        self.directory.member_organizations(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct FakeDirectory {
        roles: Mutex<HashMap<(Uuid, Uuid), Role>>,
    }

    #[async_trait]
    impl OrganizationDirectory for FakeDirectory {
        async fn member_role(&self, org_id: Uuid, user_id: Uuid) -> Result<Role, RegistryError> {
            self.roles
                .lock()
                .await
                .get(&(org_id, user_id))
                .copied()
                .ok_or_else(|| RegistryError::permission_denied(NOT_A_MEMBER))
        }

        async fn member_organizations(&self, user_id: Uuid) -> Result<Vec<Uuid>, RegistryError> {
            Ok(self
                .roles
                .lock()
                .await
                .keys()
                .filter(|(_, u)| *u == user_id)
                .map(|(org, _)| *org)
                .collect())
        }
    }

    fn gate_with(roles: Vec<((Uuid, Uuid), Role)>) -> Gate<FakeDirectory> {
        Gate::new(FakeDirectory {
            roles: Mutex::new(roles.into_iter().collect()),
        })
    }

    #[tokio::test]
    async fn owner_passes_owner_gate_reader_does_not() {
        let org = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let reader = Uuid::new_v4();
        let gate = gate_with(vec![((org, owner), Role::Owner), ((org, reader), Role::Reader)]);

        assert!(gate.require_owner(org, owner).await.is_ok());
        let err = gate.require_owner(org, reader).await.unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[tokio::test]
    async fn non_member_fails_every_gate() {
        let org = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let gate = gate_with(vec![]);

        assert!(gate.require_member(org, stranger).await.is_err());
        assert!(gate.require_owner(org, stranger).await.is_err());
        assert!(gate.require_owner_or_author(org, stranger).await.is_err());
    }

    #[tokio::test]
    async fn author_may_write_but_not_administer() {
        let org = Uuid::new_v4();
        let author = Uuid::new_v4();
        let gate = gate_with(vec![((org, author), Role::Author)]);

        assert!(gate.require_owner_or_author(org, author).await.is_ok());
        assert!(gate.require_owner(org, author).await.is_err());
    }
}
