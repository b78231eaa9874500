//! SdkPreference row (spec.md §3). At most one row per `(repository_id, sdk)`,
//! enforced by a unique index created alongside the table (see `db::schema`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum Sdk {
    #[sea_orm(string_value = "GO_PROTOBUF")]
    GoProtobuf,
    #[sea_orm(string_value = "GO_CONNECTRPC")]
    GoConnectRpc,
    #[sea_orm(string_value = "GO_GRPC")]
    GoGrpc,
    #[sea_orm(string_value = "JS_BUFBUILD_ES")]
    JsBufbuildEs,
    #[sea_orm(string_value = "JS_PROTOBUF")]
    JsProtobuf,
    #[sea_orm(string_value = "JS_CONNECTRPC")]
    JsConnectRpc,
}

impl Sdk {
    pub const ALL: [Sdk; 6] = [
        Sdk::GoProtobuf,
        Sdk::GoConnectRpc,
        Sdk::GoGrpc,
        Sdk::JsBufbuildEs,
        Sdk::JsProtobuf,
        Sdk::JsConnectRpc,
    ];

    /// `<sdkDirName>` in spec.md §6's persisted state layout.
    pub const fn dir_name(&self) -> &'static str {
        match self {
            Sdk::GoProtobuf => "go-protobuf",
            Sdk::GoConnectRpc => "go-connectrpc",
            Sdk::GoGrpc => "go-grpc",
            Sdk::JsBufbuildEs => "js-bufbuild-es",
            Sdk::JsProtobuf => "js-protobuf",
            Sdk::JsConnectRpc => "js-connectrpc",
        }
    }

    pub const fn is_go(&self) -> bool {
        matches!(self, Sdk::GoProtobuf | Sdk::GoConnectRpc | Sdk::GoGrpc)
    }

    pub const fn is_js(&self) -> bool {
        !self.is_go()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sdk_preferences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub repository_id: Uuid,
    pub sdk: Sdk,
    pub status: bool,
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
