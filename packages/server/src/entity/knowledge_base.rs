use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Who can see a knowledge base and its contents.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum KbVisibility {
    /// Listed publicly and open to subscription.
    #[sea_orm(string_value = "public")]
    Public,
    /// Owner only.
    #[sea_orm(string_value = "private")]
    Private,
    /// Unlisted; only the owner can view it.
    #[sea_orm(string_value = "restricted")]
    Restricted,
    /// The automatically created per-user base. Shared like public.
    #[sea_orm(string_value = "default")]
    Default,
}

impl KbVisibility {
    /// Whether non-owners may view and subscribe.
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Public | Self::Default)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "knowledge_bases")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub uid: String,
    pub user_id: i32,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub visibility: KbVisibility,
    pub is_deleted: bool,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::content_kb_mapping::Entity")]
    ContentKbMapping,
    #[sea_orm(has_many = "super::kb_subscription::Entity")]
    KbSubscription,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::content_kb_mapping::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ContentKbMapping.def()
    }
}

impl Related<super::kb_subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KbSubscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
