use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::chat_assistant::ChatStartType;

/// Local mirror of a remote chat session. `agent_id` is the remote
/// assistant the session was opened against; when the assistant changes
/// the session is recreated.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "session_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,
    pub chat_start_type: ChatStartType,
    pub content_id: Option<i32>,
    pub kb_id: Option<i32>,
    #[sea_orm(unique)]
    pub session_id: String,
    pub agent_id: Option<String>,
    pub use_web_search: bool,
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
