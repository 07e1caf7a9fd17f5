mod config;
mod error;
mod handlers;
mod state;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::jobs::{EnrichJob, IndexJob, IndexOutcome, JobResult};
use common::retry::{
    RetryCleanupGuard, RetryDecision, RetryTracker, calculate_backoff, spawn_cleanup_task,
};
use common::{DlqConfig, DlqEnvelope, DlqErrorCode, DlqMessageType};
use mq::{BroccoliError, BrokerMessage, MqConfig, init_mq};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::WorkerAppConfig;
use crate::error::WorkerError;
use crate::handlers::index::IndexStart;
use crate::state::WorkerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = WorkerAppConfig::load().context("Failed to load config")?;
    info!("Worker starting: {}", config.worker.id);

    let state = Arc::new(
        WorkerState::from_config(&config)
            .await
            .context("Failed to build clients")?,
    );

    let mq = Arc::new(
        init_mq(MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("Failed to initialize MQ")?,
    );

    info!(
        enrich_queue_name = %config.mq.enrich_queue_name,
        index_queue_name = %config.mq.index_queue_name,
        result_queue_name = %config.mq.result_queue_name,
        dlq_queue_name = %config.mq.dlq_queue_name,
        max_retries = config.mq.dlq.max_retries,
        "MQ connected"
    );

    let retry_tracker = Arc::new(Mutex::new(RetryTracker::new(config.mq.dlq.max_retries)));

    // TODO: Store handle for graceful shutdown. Currently the task runs until process exit.
    let _cleanup_handle = spawn_cleanup_task(
        retry_tracker.clone(),
        Duration::from_secs(config.mq.dlq.retry_cleanup_interval_secs),
        Duration::from_secs(config.mq.dlq.retry_max_age_secs),
    );

    let result = tokio::try_join!(
        consume_enrich_jobs(
            Arc::clone(&mq),
            Arc::clone(&state),
            &config,
            Arc::clone(&retry_tracker),
        ),
        consume_index_jobs(
            Arc::clone(&mq),
            Arc::clone(&state),
            &config,
            Arc::clone(&retry_tracker),
        ),
    );

    if let Err(e) = result {
        error!(error = %e, "Worker stopped unexpectedly");
    }

    Ok(())
}

/// Consume the enrichment queue until the broker connection dies.
async fn consume_enrich_jobs(
    mq: Arc<mq::Mq>,
    state: Arc<WorkerState>,
    config: &WorkerAppConfig,
    retry_tracker: Arc<Mutex<RetryTracker>>,
) -> Result<(), BroccoliError> {
    info!(queue = %config.mq.enrich_queue_name, "Starting enrich job consumer");

    let result_queue = config.mq.result_queue_name.clone();
    let dlq_queue = config.mq.dlq_queue_name.clone();
    let dlq_config = config.mq.dlq.clone();
    let mq_for_handler = Arc::clone(&mq);

    mq.process_messages(
        &config.mq.enrich_queue_name,
        Some(config.worker.batch_size), // concurrent workers
        None,
        move |message: BrokerMessage<serde_json::Value>| {
            let mq = Arc::clone(&mq_for_handler);
            let state = Arc::clone(&state);
            let result_queue = result_queue.clone();
            let dlq_queue = dlq_queue.clone();
            let dlq_config = dlq_config.clone();
            let retry_tracker = Arc::clone(&retry_tracker);
            async move {
                process_enrich_message(
                    message,
                    &mq,
                    &state,
                    &result_queue,
                    &dlq_queue,
                    &dlq_config,
                    &retry_tracker,
                )
                .await
            }
        },
    )
    .await
}

/// Consume the index queue until the broker connection dies.
async fn consume_index_jobs(
    mq: Arc<mq::Mq>,
    state: Arc<WorkerState>,
    config: &WorkerAppConfig,
    retry_tracker: Arc<Mutex<RetryTracker>>,
) -> Result<(), BroccoliError> {
    info!(queue = %config.mq.index_queue_name, "Starting index job consumer");

    let result_queue = config.mq.result_queue_name.clone();
    let dlq_queue = config.mq.dlq_queue_name.clone();
    let dlq_config = config.mq.dlq.clone();
    let mq_for_handler = Arc::clone(&mq);

    mq.process_messages(
        &config.mq.index_queue_name,
        Some(config.worker.batch_size), // concurrent workers
        None,
        move |message: BrokerMessage<serde_json::Value>| {
            let mq = Arc::clone(&mq_for_handler);
            let state = Arc::clone(&state);
            let result_queue = result_queue.clone();
            let dlq_queue = dlq_queue.clone();
            let dlq_config = dlq_config.clone();
            let retry_tracker = Arc::clone(&retry_tracker);
            async move {
                process_index_message(
                    message,
                    &mq,
                    &state,
                    &result_queue,
                    &dlq_queue,
                    &dlq_config,
                    &retry_tracker,
                )
                .await
            }
        },
    )
    .await
}

async fn process_enrich_message(
    message: BrokerMessage<serde_json::Value>,
    mq: &Arc<mq::Mq>,
    state: &Arc<WorkerState>,
    result_queue: &str,
    dlq_queue: &str,
    dlq_config: &DlqConfig,
    retry_tracker: &Arc<Mutex<RetryTracker>>,
) -> Result<(), BroccoliError> {
    let payload = message.payload;

    let job: EnrichJob = match serde_json::from_value(payload.clone()) {
        Ok(job) => job,
        Err(e) => {
            return dead_letter_undecodable(payload, DlqMessageType::EnrichJob, &e, mq, dlq_queue)
                .await;
        }
    };
    let job_id = job.job_id.clone();

    deliver_with_retries(
        &job_id,
        job.content_id,
        DlqMessageType::EnrichJob,
        payload,
        mq,
        dlq_queue,
        dlq_config,
        retry_tracker,
        || run_enrich_job(&job, state, mq, result_queue),
    )
    .await
}

async fn process_index_message(
    message: BrokerMessage<serde_json::Value>,
    mq: &Arc<mq::Mq>,
    state: &Arc<WorkerState>,
    result_queue: &str,
    dlq_queue: &str,
    dlq_config: &DlqConfig,
    retry_tracker: &Arc<Mutex<RetryTracker>>,
) -> Result<(), BroccoliError> {
    let payload = message.payload;

    let job: IndexJob = match serde_json::from_value(payload.clone()) {
        Ok(job) => job,
        Err(e) => {
            return dead_letter_undecodable(payload, DlqMessageType::IndexJob, &e, mq, dlq_queue)
                .await;
        }
    };
    let job_id = job.job_id.clone();

    deliver_with_retries(
        &job_id,
        job.content_id,
        DlqMessageType::IndexJob,
        payload,
        mq,
        dlq_queue,
        dlq_config,
        retry_tracker,
        || run_index_job(&job, state, mq, result_queue),
    )
    .await
}

/// A message that does not decode can never succeed; wrap it for the DLQ
/// and take it off the queue without retrying.
async fn dead_letter_undecodable(
    payload: serde_json::Value,
    message_type: DlqMessageType,
    decode_error: &serde_json::Error,
    mq: &Arc<mq::Mq>,
    dlq_queue: &str,
) -> Result<(), BroccoliError> {
    error!(message_type = %message_type, error = %decode_error, "Failed to parse job payload");

    let message_id = payload
        .get("job_id")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let content_id = payload
        .get("content_id")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);

    let envelope = DlqEnvelope {
        message_id,
        message_type,
        content_id,
        payload,
        error_code: DlqErrorCode::DeserializationError,
        error_message: format!("Failed to parse job payload: {decode_error}"),
        retry_history: vec![],
    };

    if let Err(pub_err) = mq.publish(dlq_queue, None, &envelope, None).await {
        error!(error = %pub_err, "Failed to publish to DLQ");
    }

    Ok(())
}

/// Drive one job to success, retrying with backoff and dead-lettering it
/// once attempts are exhausted.
#[allow(clippy::too_many_arguments)]
async fn deliver_with_retries<F, Fut>(
    job_id: &str,
    content_id: i32,
    message_type: DlqMessageType,
    payload: serde_json::Value,
    mq: &Arc<mq::Mq>,
    dlq_queue: &str,
    dlq_config: &DlqConfig,
    retry_tracker: &Arc<Mutex<RetryTracker>>,
    run: F,
) -> Result<(), BroccoliError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), WorkerError>>,
{
    let mut cleanup_guard = RetryCleanupGuard::new(retry_tracker, job_id);

    loop {
        match run().await {
            Ok(()) => {
                retry_tracker.lock().await.clear(job_id);
                cleanup_guard.defuse();
                return Ok(());
            }
            Err(e) => {
                let error_str = e.to_string();
                let decision = retry_tracker.lock().await.record_failure(job_id, &error_str);

                match decision {
                    RetryDecision::Retry { attempt, .. } => {
                        let delay = calculate_backoff(
                            attempt,
                            dlq_config.base_delay_ms,
                            dlq_config.max_delay_ms,
                        );
                        warn!(
                            content_id,
                            job_id = %job_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying job processing"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::Exhausted { history } => {
                        error!(
                            content_id,
                            job_id = %job_id,
                            retry_count = history.len(),
                            error = %e,
                            "Max retries exhausted, sending to DLQ"
                        );

                        let envelope = DlqEnvelope {
                            message_id: job_id.to_string(),
                            message_type,
                            content_id: Some(content_id),
                            payload,
                            error_code: DlqErrorCode::MaxRetriesExceeded,
                            error_message: error_str,
                            retry_history: history,
                        };

                        if let Err(pub_err) = mq.publish(dlq_queue, None, &envelope, None).await {
                            error!(error = %pub_err, "Failed to publish to DLQ queue");
                            return Err(BroccoliError::Publish(format!(
                                "Failed to publish to DLQ: {pub_err}"
                            )));
                        }

                        cleanup_guard.defuse();
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// One enrichment attempt: derive the fields and publish the result.
async fn run_enrich_job(
    job: &EnrichJob,
    state: &Arc<WorkerState>,
    mq: &Arc<mq::Mq>,
    result_queue: &str,
) -> Result<(), WorkerError> {
    info!(
        content_id = job.content_id,
        job_id = %job.job_id,
        media_type = %job.media_type,
        "Processing enrich job"
    );

    let output = handlers::enrich::handle_enrich_job(job, &state.llm).await?;

    let result = JobResult::Enriched {
        job_id: job.job_id.clone(),
        content_id: job.content_id,
        generation: job.generation,
        output,
    };
    publish_result(mq, result_queue, &result).await?;

    info!(
        content_id = job.content_id,
        job_id = %job.job_id,
        "Published enrichment result"
    );
    Ok(())
}

/// One indexing attempt: upload the document, report the linkage, watch
/// parsing and report the terminal outcome.
async fn run_index_job(
    job: &IndexJob,
    state: &Arc<WorkerState>,
    mq: &Arc<mq::Mq>,
    result_queue: &str,
) -> Result<(), WorkerError> {
    info!(
        content_id = job.content_id,
        job_id = %job.job_id,
        media_type = %job.media_type,
        "Processing index job"
    );

    let (outcome, error_message) = match handlers::index::start_indexing(job, state).await? {
        IndexStart::Rejected { reason } => {
            warn!(content_id = job.content_id, reason = %reason, "Index job rejected");
            (IndexOutcome::Failed, Some(reason))
        }
        IndexStart::Started { dataset_id, doc_id } => {
            publish_result(
                mq,
                result_queue,
                &JobResult::IndexStarted {
                    job_id: job.job_id.clone(),
                    content_id: job.content_id,
                    generation: job.generation,
                    dataset_id: dataset_id.clone(),
                    dataset_doc_id: doc_id.clone(),
                },
            )
            .await?;

            handlers::index::wait_for_parsing(&state.rag, &dataset_id, &doc_id).await
        }
    };

    publish_result(
        mq,
        result_queue,
        &JobResult::Indexed {
            job_id: job.job_id.clone(),
            content_id: job.content_id,
            generation: job.generation,
            outcome,
            error_message,
        },
    )
    .await?;

    info!(
        content_id = job.content_id,
        job_id = %job.job_id,
        outcome = ?outcome,
        "Published index result"
    );
    Ok(())
}

async fn publish_result(
    mq: &Arc<mq::Mq>,
    result_queue: &str,
    result: &JobResult,
) -> Result<(), WorkerError> {
    mq.publish(result_queue, None, result, None)
        .await
        .map_err(|e| WorkerError::Mq(format!("Failed to publish JobResult: {e}")))?;
    Ok(())
}
