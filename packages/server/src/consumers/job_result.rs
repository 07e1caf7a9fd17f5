use std::sync::Arc;

use chrono::Utc;
use common::RagStatus;
use common::jobs::{IndexOutcome, JobResult};
use mq::{BroccoliError, BrokerMessage, Mq};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QuerySelect, Set, TransactionTrait,
};
use tracing::{error, info, warn};

use crate::entity::content;

/// Consume worker results from the result queue.
pub async fn consume_job_results(db: DatabaseConnection, mq: Arc<Mq>, queue_name: String) {
    info!(queue = %queue_name, "Starting job result consumer");

    let result = mq
        .process_messages(
            &queue_name,
            None, // single-threaded for sequential DB writes
            None,
            move |message: BrokerMessage<JobResult>| {
                let db = db.clone();
                async move {
                    let result = message.payload;
                    let content_id = result.content_id();
                    let job_id = result.job_id().to_owned();

                    if let Err(e) = process_job_result(&db, result).await {
                        error!(
                            content_id,
                            job_id = %job_id,
                            error = %e,
                            "Failed to process job result"
                        );
                        return Err(BroccoliError::Job(e.to_string()));
                    }
                    Ok(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Job result consumer stopped unexpectedly");
    }
}

/// Apply a single worker result to its content row.
///
/// The row is locked for the duration; a result whose generation no longer
/// matches the row was produced by a superseded attempt and is dropped.
async fn process_job_result(db: &DatabaseConnection, result: JobResult) -> anyhow::Result<()> {
    let content_id = result.content_id();
    let generation = result.generation();

    let txn = db.begin().await?;

    let row = content::Entity::find_by_id(content_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Content {} not found", content_id))?;

    if row.attempt_generation != generation {
        info!(
            content_id,
            job_id = %result.job_id(),
            row_generation = row.attempt_generation,
            result_generation = generation,
            "Stale job result dropped"
        );
        txn.commit().await?;
        return Ok(());
    }

    match result {
        JobResult::Enriched { job_id, output, .. } => {
            let mut update = content::ActiveModel {
                id: Set(row.id),
                ai_summary: Set(Some(output.summary)),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            // Best-effort fields only overwrite when the worker produced
            // them; a partial enrichment keeps earlier values in place.
            if let Some(v) = output.structure {
                update.ai_structure = Set(Some(v));
            }
            if let Some(v) = output.mermaid {
                update.ai_mermaid = Set(Some(v));
            }
            if let Some(v) = output.recommend_reason {
                update.ai_recommend_reason = Set(Some(v));
            }
            if let Some(tags) = output.tags {
                update.ai_tags = Set(Some(serde_json::to_value(tags).unwrap_or_default()));
            }
            update.update(&txn).await?;
            txn.commit().await?;

            info!(content_id, job_id = %job_id, "Enrichment result applied");
        }
        JobResult::IndexStarted {
            job_id,
            dataset_id,
            dataset_doc_id,
            ..
        } => {
            if !row.rag_status.can_transition(RagStatus::Processing) {
                info!(
                    content_id,
                    job_id = %job_id,
                    current = %row.rag_status,
                    "Index start ignored, row not awaiting upload"
                );
                txn.commit().await?;
                return Ok(());
            }

            let update = content::ActiveModel {
                id: Set(row.id),
                rag_status: Set(RagStatus::Processing),
                dataset_id: Set(Some(dataset_id.clone())),
                dataset_doc_id: Set(Some(dataset_doc_id)),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            update.update(&txn).await?;
            txn.commit().await?;

            info!(
                content_id,
                job_id = %job_id,
                dataset_id = %dataset_id,
                "Index upload recorded"
            );
        }
        JobResult::Indexed {
            job_id,
            outcome,
            error_message,
            ..
        } => {
            let target = match outcome {
                IndexOutcome::Completed => RagStatus::Completed,
                IndexOutcome::PartiallyCompleted => RagStatus::PartiallyCompleted,
                IndexOutcome::Failed => RagStatus::Failed,
            };

            if !row.rag_status.can_transition(target) {
                info!(
                    content_id,
                    job_id = %job_id,
                    current = %row.rag_status,
                    target = %target,
                    "Index result ignored, transition not allowed"
                );
                txn.commit().await?;
                return Ok(());
            }

            let update = content::ActiveModel {
                id: Set(row.id),
                rag_status: Set(target),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            update.update(&txn).await?;
            txn.commit().await?;

            if let Some(message) = error_message {
                warn!(
                    content_id,
                    job_id = %job_id,
                    outcome = ?outcome,
                    error = %message,
                    "Index job finished with errors"
                );
            } else {
                info!(content_id, job_id = %job_id, outcome = ?outcome, "Index result applied");
            }
        }
    }

    Ok(())
}
