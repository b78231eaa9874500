//! Repository row (spec.md §3 "Repository").
//!
//! `path` is always `reposRoot/id` and is stored redundantly (rather than
//! recomputed from `id` everywhere) so callers that only have the row in hand
//! never need a reference to the configured `reposRoot` to find the bare
//! directory.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum Visibility {
    #[sea_orm(string_value = "private")]
    Private,
    #[sea_orm(string_value = "public")]
    Public,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Private
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub path: String,
    pub visibility: Visibility,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sdk_preference::Entity")]
    SdkPreference,
    #[sea_orm(has_many = "super::trigger_job::Entity")]
    TriggerJob,
}

impl Related<super::sdk_preference::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SdkPreference.def()
    }
}

impl Related<super::trigger_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TriggerJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
