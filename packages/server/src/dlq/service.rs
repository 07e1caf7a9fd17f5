use chrono::Utc;
use common::{DlqEnvelope, DlqErrorCode, DlqMessageType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr,
};

use crate::entity::dead_letter_message;

/// Persistence for failed pipeline messages.
///
/// Entries are never deleted by the application; `resolved` is flipped by
/// hand after an operator has dealt with the failure, and unresolved rows
/// keep the stale-content sweeper from filing the same content twice.
pub struct DlqService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> DlqService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Persist a worker envelope from the DLQ queue.
    pub async fn send_to_dlq(
        &self,
        envelope: &DlqEnvelope,
    ) -> Result<dead_letter_message::Model, DbErr> {
        let first_failed_at = envelope
            .retry_history
            .first()
            .map_or_else(Utc::now, |attempt| attempt.timestamp);

        let row = dead_letter_message::ActiveModel {
            message_id: Set(envelope.message_id.clone()),
            message_type: Set(envelope.message_type.to_string()),
            content_id: Set(envelope.content_id),
            payload: Set(envelope.payload.clone()),
            error_message: Set(envelope.error_message.clone()),
            error_code: Set(envelope.error_code.to_string()),
            retry_count: Set(envelope.retry_history.len() as i32),
            retry_history: Set(serde_json::to_value(&envelope.retry_history).unwrap_or_default()),
            first_failed_at: Set(first_failed_at),
            created_at: Set(Utc::now()),
            resolved: Set(false),
            resolved_at: Set(None),
            ..Default::default()
        };

        self.insert_deduped(&envelope.message_id, row).await
    }

    /// File a server-side failure that never went through the queue.
    pub async fn create_entry(
        &self,
        message_id: String,
        message_type: DlqMessageType,
        content_id: Option<i32>,
        payload: serde_json::Value,
        error_code: DlqErrorCode,
        error_message: String,
    ) -> Result<dead_letter_message::Model, DbErr> {
        self.send_to_dlq(&DlqEnvelope {
            message_id,
            message_type,
            content_id,
            payload,
            error_code,
            error_message,
            retry_history: Vec::new(),
        })
        .await
    }

    /// Redelivered envelopes hit the unique `message_id` index; the first
    /// insert wins and later deliveries read that row back.
    async fn insert_deduped(
        &self,
        message_id: &str,
        row: dead_letter_message::ActiveModel,
    ) -> Result<dead_letter_message::Model, DbErr> {
        let conflict = match row.insert(self.conn).await {
            Ok(inserted) => return Ok(inserted),
            Err(e) => e,
        };
        if !matches!(conflict.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
            return Err(conflict);
        }

        dead_letter_message::Entity::find()
            .filter(dead_letter_message::Column::MessageId.eq(message_id))
            .one(self.conn)
            .await?
            .ok_or_else(|| {
                DbErr::RecordNotFound(format!(
                    "dead letter {message_id} missing after duplicate insert"
                ))
            })
    }

    /// Whether a content row already has an unresolved dead letter.
    pub async fn has_unresolved_entry(&self, content_id: i32) -> Result<bool, DbErr> {
        let existing = dead_letter_message::Entity::find()
            .filter(dead_letter_message::Column::ContentId.eq(content_id))
            .filter(dead_letter_message::Column::Resolved.eq(false))
            .one(self.conn)
            .await?;

        Ok(existing.is_some())
    }
}
