use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What a conversation is scoped to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum ChatStartType {
    /// Everything the user owns that is ready.
    #[sea_orm(string_value = "inbox")]
    Inbox,
    /// All of the user's knowledge bases.
    #[sea_orm(string_value = "my_knowledge_bases")]
    MyKnowledgeBases,
    /// One knowledge base.
    #[sea_orm(string_value = "single_knowledge_base")]
    SingleKnowledgeBase,
    /// One content item.
    #[sea_orm(string_value = "article")]
    Article,
}

impl ChatStartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::MyKnowledgeBases => "my_knowledge_bases",
            Self::SingleKnowledgeBase => "single_knowledge_base",
            Self::Article => "article",
        }
    }
}

impl std::fmt::Display for ChatStartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Local mirror of a remote chat assistant. The remote side is looked up
/// by `name`; the row records which scope the assistant was built for.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chat_assistants")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub name: String,
    pub user_id: i32,
    pub chat_start_type: ChatStartType,
    pub kb_id: Option<i32>,
    pub content_id: Option<i32>,
    /// Remote assistant id, cached after creation.
    pub agent_id: Option<String>,
    pub description: Option<String>,
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
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
