use std::time::Duration;

use chrono::Utc;
use common::{DlqErrorCode, DlqMessageType, MediaType, ProcessingStatus};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::entity::content;

use super::DlqService;

/// Run the stale content sweeper as a background task.
///
/// Catches rows whose extraction task died without reaching a terminal
/// status, typically after a server restart mid-flight.
pub async fn run_stale_content_sweeper(db: DatabaseConnection, config: IngestConfig) {
    let scan_interval = Duration::from_secs(config.stale_sweep_interval_secs);

    info!(
        stale_after_secs = config.stale_after_secs,
        scan_interval_secs = config.stale_sweep_interval_secs,
        "Starting stale content sweeper"
    );

    let mut interval = tokio::time::interval(scan_interval);

    loop {
        interval.tick().await;

        if let Err(e) = sweep_stale_contents(&db, &config).await {
            error!(error = %e, "Stale content sweep failed");
        }
    }
}

/// One sweep pass: scan for stale in-flight rows and move them to the DLQ.
pub async fn sweep_stale_contents(
    db: &DatabaseConnection,
    config: &IngestConfig,
) -> anyhow::Result<()> {
    let threshold = Utc::now() - chrono::Duration::seconds(config.stale_after_secs);

    // Long videos legitimately transcribe for a while; leave them alone.
    let stale_ids: Vec<i32> = content::Entity::find()
        .select_only()
        .column(content::Column::Id)
        .filter(
            content::Column::ProcessingStatus
                .is_in([ProcessingStatus::WaitingInit, ProcessingStatus::Pending]),
        )
        .filter(content::Column::UpdatedAt.lt(threshold))
        .filter(content::Column::MediaType.ne(MediaType::Video))
        .limit(config.stale_sweep_limit)
        .into_tuple()
        .all(db)
        .await?;

    if stale_ids.is_empty() {
        return Ok(());
    }

    info!(count = stale_ids.len(), "Found stale contents, moving to DLQ");

    for content_id in stale_ids {
        if let Err(e) = handle_stale_content(db, content_id, config).await {
            error!(
                content_id,
                error = %e,
                "Failed to handle stale content"
            );
        }
    }

    Ok(())
}

async fn handle_stale_content(
    db: &DatabaseConnection,
    content_id: i32,
    config: &IngestConfig,
) -> anyhow::Result<()> {
    let txn = db.begin().await?;

    let row = content::Entity::find_by_id(content_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let Some(row) = row else {
        txn.rollback().await?;
        return Ok(());
    };

    if !row.processing_status.is_in_flight() {
        txn.rollback().await?;
        return Ok(());
    }

    let dlq = DlqService::new(&txn);
    if dlq.has_unresolved_entry(row.id).await? {
        warn!(
            content_id,
            "Content already has unresolved DLQ entry, skipping"
        );
        txn.rollback().await?;
        return Ok(());
    }

    let payload = serde_json::json!({
        "content_id": row.id,
        "uid": row.uid,
        "user_id": row.user_id,
        "media_type": row.media_type,
        "processing_status": row.processing_status,
        "attempt_generation": row.attempt_generation,
        "updated_at": row.updated_at,
    });

    dlq.create_entry(
        format!("content-{}-gen-{}", row.id, row.attempt_generation),
        DlqMessageType::Extraction,
        Some(row.id),
        payload,
        DlqErrorCode::StuckContent,
        format!(
            "Content stuck in {} for over {} seconds",
            row.processing_status, config.stale_after_secs
        ),
    )
    .await?;

    mark_content_failed(&txn, &row).await?;

    txn.commit().await?;

    info!(content_id, "Moved stale content to DLQ");

    Ok(())
}

/// Move a stale row to FAILED so the user can retry it.
async fn mark_content_failed(txn: &DatabaseTransaction, row: &content::Model) -> anyhow::Result<()> {
    let now = Utc::now();

    // WAITING_INIT has no direct edge to FAILED; step through PENDING so
    // both writes stay legal transitions.
    if row.processing_status == ProcessingStatus::WaitingInit {
        let step = content::ActiveModel {
            id: Set(row.id),
            processing_status: Set(ProcessingStatus::Pending),
            updated_at: Set(now),
            ..Default::default()
        };
        step.update(txn).await?;
    }

    let update = content::ActiveModel {
        id: Set(row.id),
        processing_status: Set(ProcessingStatus::Failed),
        updated_at: Set(now),
        ..Default::default()
    };
    update.update(txn).await?;

    Ok(())
}
