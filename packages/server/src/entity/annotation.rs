use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A W3C Web Annotation anchored to a content item. The annotation body
/// is stored verbatim as JSON; the server only validates its envelope.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "annotations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub uid: String,
    pub user_id: i32,
    pub target_content_id: i32,
    pub content: Json,
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
    #[sea_orm(
        belongs_to = "super::content::Entity",
        from = "Column::TargetContentId",
        to = "super::content::Column::Id"
    )]
    Content,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::content::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Content.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
