use std::sync::Arc;

use common::dlq::{DlqEnvelope, DlqMessageType};
use common::jobs::IndexJob;
use mq::{BrokerMessage, Mq};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{error, info, warn};

use super::mark_rag_failed;
use crate::dlq::DlqService;

/// Consume dead-lettered messages published by the worker.
///
/// Every envelope is persisted for operators. A dead enrich job needs no
/// status change (the summary columns simply stay empty); a dead index job
/// additionally fails the retrieval side so readers stop waiting on it.
pub async fn consume_worker_dlq(db: DatabaseConnection, mq: Arc<Mq>, queue_name: String) {
    info!(queue = %queue_name, "Starting worker DLQ consumer");

    let result = mq
        .process_messages(
            &queue_name,
            None,
            None,
            move |message: BrokerMessage<DlqEnvelope>| {
                let db = db.clone();
                async move {
                    let envelope = message.payload;

                    if let Err(e) = persist_envelope(&db, &envelope).await {
                        error!(
                            content_id = envelope.content_id,
                            message_id = %envelope.message_id,
                            error = %e,
                            "Failed to persist worker DLQ envelope"
                        );
                        return Err(e);
                    }

                    if envelope.message_type == DlqMessageType::IndexJob {
                        fail_rag_for_dead_index_job(&db, &envelope).await;
                    }

                    info!(
                        content_id = envelope.content_id,
                        message_id = %envelope.message_id,
                        error_code = ?envelope.error_code,
                        "Persisted worker DLQ envelope"
                    );

                    Ok(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Worker DLQ consumer stopped unexpectedly");
    }
}

/// Write one envelope inside its own transaction. Errors bubble back to the
/// broker so the delivery is retried rather than acked.
async fn persist_envelope(
    db: &DatabaseConnection,
    envelope: &DlqEnvelope,
) -> Result<(), mq::BroccoliError> {
    let txn = db
        .begin()
        .await
        .map_err(|e| mq::BroccoliError::Job(format!("begin failed: {e}")))?;
    DlqService::new(&txn)
        .send_to_dlq(envelope)
        .await
        .map_err(|e| mq::BroccoliError::Job(format!("persist failed: {e}")))?;
    txn.commit()
        .await
        .map_err(|e| mq::BroccoliError::Job(format!("commit failed: {e}")))
}

/// Best-effort status update after the envelope is safely persisted.
async fn fail_rag_for_dead_index_job(db: &DatabaseConnection, envelope: &DlqEnvelope) {
    let job: IndexJob = match serde_json::from_value(envelope.payload.clone()) {
        Ok(job) => job,
        Err(e) => {
            info!(
                message_id = %envelope.message_id,
                error = %e,
                "Skipping rag status update: payload is not an index job"
            );
            return;
        }
    };

    match mark_rag_failed(db, job.content_id, job.generation).await {
        Ok(true) => info!(
            content_id = job.content_id,
            message_id = %envelope.message_id,
            "Marked rag indexing failed"
        ),
        Ok(false) => info!(
            content_id = job.content_id,
            message_id = %envelope.message_id,
            "Rag status unchanged (attempt superseded or upload never started)"
        ),
        Err(e) => warn!(
            content_id = job.content_id,
            message_id = %envelope.message_id,
            error = %e,
            "Failed to mark rag indexing failed \
             (DLQ entry persisted, row may need manual review)"
        ),
    }
}
