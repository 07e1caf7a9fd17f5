use chrono::Utc;
use common::{DlqErrorCode, DlqMessageType, MediaType, ProcessingStatus, RagStatus};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use server::config::IngestConfig;
use server::dlq::DlqService;
use server::dlq::stale::sweep_stale_contents;
use server::entity::{content, dead_letter_message};

use crate::common::TestApp;

fn sweeper_config() -> IngestConfig {
    IngestConfig {
        max_upload_bytes: 10 * 1024 * 1024,
        single_audio_max_seconds: 600.0,
        total_audio_max_seconds: 1200.0,
        batch_max_items: 10,
        subtitle_merge_seconds: 30.0,
        stale_sweep_interval_secs: 3600,
        stale_after_secs: 600,
        stale_sweep_limit: 100,
    }
}

async fn backdate(app: &TestApp, content_id: i32, seconds: i64) {
    content::ActiveModel {
        id: Set(content_id),
        updated_at: Set(Utc::now() - chrono::Duration::seconds(seconds)),
        ..Default::default()
    }
    .update(&app.db)
    .await
    .expect("Failed to backdate content row");
}

async fn dead_letters_for(app: &TestApp, content_id: i32) -> Vec<dead_letter_message::Model> {
    dead_letter_message::Entity::find()
        .filter(dead_letter_message::Column::ContentId.eq(content_id))
        .all(&app.db)
        .await
        .expect("DB query failed")
}

mod sweeper {
    use super::*;

    #[tokio::test]
    async fn a_stuck_pending_row_is_failed_and_filed() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app
            .seed_content(
                user_id,
                "Stuck article",
                MediaType::Article,
                ProcessingStatus::Pending,
                RagStatus::WaitingInit,
            )
            .await;
        backdate(&app, row.id, 3600).await;

        sweep_stale_contents(&app.db, &sweeper_config())
            .await
            .expect("sweep failed");

        let after = app.content_row(&row.uid).await;
        assert_eq!(after.processing_status, ProcessingStatus::Failed);

        let entries = dead_letters_for(&app, row.id).await;
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.message_id, format!("content-{}-gen-0", row.id));
        assert_eq!(entry.message_type, DlqMessageType::Extraction.to_string());
        assert_eq!(entry.error_code, DlqErrorCode::StuckContent.to_string());
        assert!(!entry.resolved);
    }

    #[tokio::test]
    async fn a_stuck_placeholder_is_swept_too() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app
            .seed_content(
                user_id,
                "Abandoned placeholder",
                MediaType::Pdf,
                ProcessingStatus::WaitingInit,
                RagStatus::WaitingInit,
            )
            .await;
        backdate(&app, row.id, 3600).await;

        sweep_stale_contents(&app.db, &sweeper_config())
            .await
            .expect("sweep failed");

        let after = app.content_row(&row.uid).await;
        assert_eq!(after.processing_status, ProcessingStatus::Failed);
        assert_eq!(dead_letters_for(&app, row.id).await.len(), 1);
    }

    #[tokio::test]
    async fn videos_are_exempt() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app
            .seed_content(
                user_id,
                "Long transcription",
                MediaType::Video,
                ProcessingStatus::Pending,
                RagStatus::WaitingInit,
            )
            .await;
        backdate(&app, row.id, 3600).await;

        sweep_stale_contents(&app.db, &sweeper_config())
            .await
            .expect("sweep failed");

        let after = app.content_row(&row.uid).await;
        assert_eq!(after.processing_status, ProcessingStatus::Pending);
        assert!(dead_letters_for(&app, row.id).await.is_empty());
    }

    #[tokio::test]
    async fn fresh_rows_are_left_alone() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app
            .seed_content(
                user_id,
                "Still processing",
                MediaType::Article,
                ProcessingStatus::Pending,
                RagStatus::WaitingInit,
            )
            .await;

        sweep_stale_contents(&app.db, &sweeper_config())
            .await
            .expect("sweep failed");

        let after = app.content_row(&row.uid).await;
        assert_eq!(after.processing_status, ProcessingStatus::Pending);
        assert!(dead_letters_for(&app, row.id).await.is_empty());
    }

    #[tokio::test]
    async fn an_unresolved_entry_blocks_a_second_filing() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app
            .seed_content(
                user_id,
                "Already filed",
                MediaType::Article,
                ProcessingStatus::Pending,
                RagStatus::WaitingInit,
            )
            .await;
        backdate(&app, row.id, 3600).await;

        DlqService::new(&app.db)
            .create_entry(
                format!("content-{}-manual", row.id),
                DlqMessageType::Extraction,
                Some(row.id),
                json!({"content_id": row.id}),
                DlqErrorCode::StuckContent,
                "filed by an earlier pass".to_string(),
            )
            .await
            .expect("Failed to pre-file dead letter");

        sweep_stale_contents(&app.db, &sweeper_config())
            .await
            .expect("sweep failed");

        // The guard skips the row entirely; the pre-existing entry is the
        // only one and the row is left for the operator.
        assert_eq!(dead_letters_for(&app, row.id).await.len(), 1);
        let after = app.content_row(&row.uid).await;
        assert_eq!(after.processing_status, ProcessingStatus::Pending);
    }
}
