//! GenerationJob row (spec.md §3). One row produces one SDK artifact for one
//! `(repository, commit, sdk)` tuple. Invariant (enforced by the worker's
//! claim step, not a DB constraint): no two non-terminal rows share
//! `(repository_id, commit_hash, sdk)`.

use super::job_status::JobStatus;
use super::sdk_preference::Sdk;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const MAX_ATTEMPTS: i32 = 5;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "generation_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub repository_id: Uuid,
    pub commit_hash: String,
    pub sdk: Sdk,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::repository::Entity",
        from = "Column::RepositoryId",
        to = "super::repository::Column::Id"
    )]
    Repository,
}

impl Related<super::repository::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repository.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
