use serde::{Deserialize, Serialize};

use crate::entity::knowledge_base::{self, KbVisibility};
use crate::entity::user;
use crate::models::shared::double_option;

/// Request body for creating a knowledge base.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateKnowledgeBaseRequest {
    /// Display name (1-256 characters).
    #[schema(example = "Reading list")]
    pub name: String,
    pub description: Option<String>,
    /// Defaults to private.
    pub visibility: Option<KbVisibility>,
}

/// Request body for updating a knowledge base. Absent fields are left
/// untouched; `description: null` clears the description.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateKnowledgeBaseRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub visibility: Option<KbVisibility>,
}

/// Request body for attaching contents to a knowledge base.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct AddContentsRequest {
    pub content_uids: Vec<String>,
}

/// Outcome of an attach call: how many were requested vs actually linked.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AddContentsResponse {
    pub total: usize,
    pub added: usize,
}

/// Knowledge base representation returned by all KB endpoints.
#[derive(Serialize, utoipa::ToSchema)]
pub struct KnowledgeBaseResponse {
    pub uid: String,
    pub name: String,
    pub description: Option<String>,
    pub visibility: KbVisibility,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Owner's public identifier.
    pub user_uid: Option<String>,
    /// Owner's display name.
    pub user_name: Option<String>,
    /// Owner's avatar URL.
    pub user_picture: Option<String>,
    pub subscriber_count: u64,
    pub content_count: u64,
    pub owned: bool,
    pub subscribed: bool,
    /// Present only for shared (public/default) bases.
    pub share_page_url: Option<String>,
}

/// Per-base counters attached when building responses.
#[derive(Clone, Copy, Default)]
pub struct KbStats {
    pub subscriber_count: u64,
    pub content_count: u64,
}

impl KnowledgeBaseResponse {
    pub fn build(
        kb: knowledge_base::Model,
        owner: Option<&user::Model>,
        stats: KbStats,
        owned: bool,
        subscribed: bool,
        kb_share_page_url: &str,
    ) -> Self {
        let share_page_url = kb.visibility.is_shared().then(|| {
            format!(
                "{}/kb/{}",
                kb_share_page_url.trim_end_matches('/'),
                kb.uid
            )
        });
        Self {
            uid: kb.uid,
            name: kb.name,
            description: kb.description,
            visibility: kb.visibility,
            created_at: kb.created_at,
            updated_at: kb.updated_at,
            user_uid: owner.map(|u| u.username.clone()),
            user_name: owner.map(|u| u.nickname.clone().unwrap_or_else(|| u.username.clone())),
            user_picture: owner.and_then(|u| u.avatar.clone()),
            subscriber_count: stats.subscriber_count,
            content_count: stats.content_count,
            owned,
            subscribed,
            share_page_url,
        }
    }
}

/// List envelope for KB endpoints.
#[derive(Serialize, utoipa::ToSchema)]
pub struct KnowledgeBaseListResponse {
    pub knowledge_bases: Vec<KnowledgeBaseResponse>,
    pub total: u64,
}

/// Row in the picker of contents that can be added to a knowledge base.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AvailableContentItem {
    pub uid: String,
    pub title: Option<String>,
    pub media_type: common::MediaType,
    pub in_knowledge_base: bool,
}
