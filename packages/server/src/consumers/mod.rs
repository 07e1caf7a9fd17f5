pub mod job_result;
pub mod worker_dlq;

pub use job_result::consume_job_results;
pub use worker_dlq::consume_worker_dlq;

use chrono::Utc;
use common::RagStatus;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use crate::entity::content;

/// Mark the retrieval side of a content row failed.
///
/// Guarded on the attempt generation and the `processing` status, so a
/// superseded attempt or a row whose upload never started is left alone.
/// Returns whether a row actually changed.
pub async fn mark_rag_failed<C: ConnectionTrait>(
    conn: &C,
    content_id: i32,
    generation: i32,
) -> anyhow::Result<bool> {
    let update = content::ActiveModel {
        rag_status: Set(RagStatus::Failed),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    let result = content::Entity::update_many()
        .set(update)
        .filter(content::Column::Id.eq(content_id))
        .filter(content::Column::AttemptGeneration.eq(generation))
        .filter(content::Column::RagStatus.eq(RagStatus::Processing))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}
