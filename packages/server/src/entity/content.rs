use common::{MediaType, ProcessingStatus, RagStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A single piece of ingested content: one URL, file or episode per row.
///
/// `attempt_generation` is bumped on every retry; queue messages echo the
/// generation they were enqueued under so results of superseded attempts
/// can be dropped.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "contents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub uid: String,
    pub user_id: i32,
    pub media_type: MediaType,
    pub processing_status: ProcessingStatus,
    pub rag_status: RagStatus,

    pub source: Option<String>,
    pub file_name_in_storage: Option<String>,
    pub file_type: Option<String>,

    pub title: Option<String>,
    pub author: Option<String>,
    pub site_name: Option<String>,
    pub lang: Option<String>,
    pub published_time: Option<DateTime>,
    pub cover: Option<String>,
    pub images: Option<Json>,

    #[sea_orm(column_type = "Text", nullable)]
    pub content: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub text_content: Option<String>,
    pub content_hash: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_description: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub image_ocr: Option<String>,

    pub media_subtitles: Option<Json>,
    pub media_seconds_duration: Option<f64>,
    pub video_embed_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub ai_summary: Option<String>,
    pub ai_tags: Option<Json>,
    #[sea_orm(column_type = "Text", nullable)]
    pub ai_structure: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub ai_mermaid: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub ai_recommend_reason: Option<String>,

    pub dataset_id: Option<String>,
    pub dataset_doc_id: Option<String>,

    pub attempt_generation: i32,
    pub view_count: i32,
    pub share_count: i32,
    pub batch_id: Option<String>,
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
    #[sea_orm(has_many = "super::annotation::Entity")]
    Annotation,
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

impl Related<super::annotation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Annotation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
