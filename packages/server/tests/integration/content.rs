use common::{MediaType, ProcessingStatus, RagStatus};
use serde_json::json;

use crate::common::{TestApp, routes};

mod creation {
    use super::*;

    #[tokio::test]
    async fn creating_a_url_content_starts_extraction() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(
                routes::CONTENTS,
                &json!({"url": "https://example.com/posts/42"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "create failed: {}", res.text);
        assert!(res.body["uid"].is_string());
        assert_eq!(res.body["processing_status"], "PENDING");
        assert_eq!(res.body["rag_status"], "waiting_init");
        assert_eq!(res.body["media_type"], "article");
        assert_eq!(res.body["owned"], true);
        assert_eq!(res.body["source"], "https://example.com/posts/42");
    }

    #[tokio::test]
    async fn a_youtube_url_is_detected_as_video() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(
                routes::CONTENTS,
                &json!({"url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "create failed: {}", res.text);
        assert_eq!(res.body["media_type"], "video");
    }

    #[tokio::test]
    async fn resubmitting_the_same_url_returns_the_existing_row() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let body = json!({"url": "https://example.com/posts/42"});

        let first = app.post_with_token(routes::CONTENTS, &body, &token).await;
        assert_eq!(first.status, 201, "create failed: {}", first.text);

        let second = app.post_with_token(routes::CONTENTS, &body, &token).await;

        assert_eq!(second.status, 200);
        assert_eq!(second.body["uid"], first.body["uid"]);
    }

    #[tokio::test]
    async fn the_same_url_is_a_fresh_row_for_another_user() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let body = json!({"url": "https://example.com/posts/42"});

        let first = app.post_with_token(routes::CONTENTS, &body, &piper).await;
        let second = app.post_with_token(routes::CONTENTS, &body, &sable).await;

        assert_eq!(second.status, 201);
        assert_ne!(second.body["uid"], first.body["uid"]);
    }

    #[tokio::test]
    async fn an_invalid_url_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(routes::CONTENTS, &json!({"url": "not a url"}), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn filing_into_an_unknown_knowledge_base_fails() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(
                routes::CONTENTS,
                &json!({"url": "https://example.com/posts/42", "kb_uid": "missing"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn filing_into_a_knowledge_base_links_the_content() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let kb_uid = app.create_kb(&token, "Reading list", "private").await;

        let res = app
            .post_with_token(
                routes::CONTENTS,
                &json!({"url": "https://example.com/posts/42", "kb_uid": kb_uid}),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "create failed: {}", res.text);
        assert_eq!(res.body["belonged_kbs"][0]["uid"], json!(kb_uid));

        let listed = app.get_with_token(&routes::kb_contents(&kb_uid), &token).await;
        assert_eq!(listed.status, 200);
        assert_eq!(listed.body["total"], 1);
        assert_eq!(listed.body["items"][0]["uid"], res.body["uid"]);
    }
}

mod batching {
    use super::*;

    #[tokio::test]
    async fn placeholders_share_a_batch_id_and_read_as_pending() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(
                routes::CONTENTS_BATCH,
                &json!({"items": [
                    {"media_type": "text", "file_name": "notes.md"},
                    {"media_type": "pdf", "file_name": "paper.pdf"},
                ]}),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "batch failed: {}", res.text);
        assert!(res.body["batch_id"].is_string());
        let items = res.body["items"].as_array().expect("items array");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["file_name"], "notes.md");
        assert_eq!(items[0]["status"], "PENDING");

        // Internally the rows wait for their files.
        let uid = items[0]["uid"].as_str().expect("uid");
        let row = app.content_row(uid).await;
        assert_eq!(row.processing_status, ProcessingStatus::WaitingInit);
        assert_eq!(row.batch_id.as_deref(), res.body["batch_id"].as_str());
    }

    #[tokio::test]
    async fn an_empty_batch_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(routes::CONTENTS_BATCH, &json!({"items": []}), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn a_batch_over_the_item_limit_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let items: Vec<_> = (0..11)
            .map(|i| json!({"media_type": "text", "file_name": format!("file-{i}.txt")}))
            .collect();

        let res = app
            .post_with_token(routes::CONTENTS_BATCH, &json!({"items": items}), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod uploads {
    use super::*;

    #[tokio::test]
    async fn uploading_a_text_file_creates_a_pending_row() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .upload_with_token(
                routes::CONTENTS_UPLOAD,
                "notes.txt",
                b"magpies collect shiny things".to_vec(),
                Some("text"),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "upload failed: {}", res.text);
        assert_eq!(res.body["media_type"], "text");
        assert_eq!(res.body["processing_status"], "PENDING");
        assert_eq!(res.body["title"], "notes");
        assert!(res.body["file_url"].is_string());
    }

    #[tokio::test]
    async fn a_link_media_type_cannot_be_uploaded() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .upload_with_token(
                routes::CONTENTS_UPLOAD,
                "page.html",
                b"<html></html>".to_vec(),
                Some("article"),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "FILE_TYPE_NOT_SUPPORTED");
    }

    #[tokio::test]
    async fn an_upload_without_media_type_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .upload_with_token(
                routes::CONTENTS_UPLOAD,
                "notes.txt",
                b"text".to_vec(),
                None,
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn a_placeholder_accepts_its_file_exactly_once() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let batch = app
            .post_with_token(
                routes::CONTENTS_BATCH,
                &json!({"items": [{"media_type": "text", "file_name": "notes.txt"}]}),
                &token,
            )
            .await;
        assert_eq!(batch.status, 201, "batch failed: {}", batch.text);
        let uid = batch.body["items"][0]["uid"].as_str().expect("uid").to_string();

        let first = app
            .upload_with_token(
                &routes::content_upload(&uid),
                "notes.txt",
                b"magpies collect shiny things".to_vec(),
                None,
                &token,
            )
            .await;
        assert_eq!(first.status, 200, "upload failed: {}", first.text);
        assert_eq!(first.body["processing_status"], "PENDING");

        let second = app
            .upload_with_token(
                &routes::content_upload(&uid),
                "notes.txt",
                b"again".to_vec(),
                None,
                &token,
            )
            .await;
        assert_eq!(second.status, 409);
        assert_eq!(second.body["code"], "CONFLICT");
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn contents_are_paged_newest_first() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;

        let first = app.seed_completed_content(user_id, "First").await;
        let second = app.seed_completed_content(user_id, "Second").await;
        let third = app.seed_completed_content(user_id, "Third").await;

        let page = app
            .get_with_token(&format!("{}?limit=2", routes::CONTENTS), &token)
            .await;
        assert_eq!(page.status, 200, "list failed: {}", page.text);
        let items = page.body["items"].as_array().expect("items array");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["uid"], json!(third.uid));
        assert_eq!(items[1]["uid"], json!(second.uid));
        let cursor = page.body["next_cursor"].as_str().expect("next_cursor");
        assert_eq!(cursor, second.uid);

        let rest = app
            .get_with_token(
                &format!("{}?limit=2&cursor={cursor}", routes::CONTENTS),
                &token,
            )
            .await;
        assert_eq!(rest.status, 200);
        let items = rest.body["items"].as_array().expect("items array");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["uid"], json!(first.uid));
        assert!(rest.body["next_cursor"].is_null());
    }

    #[tokio::test]
    async fn an_unknown_cursor_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .get_with_token(&format!("{}?cursor=nope", routes::CONTENTS), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn fetch_by_uids_marks_ownership() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        app.create_authenticated_user("sable", "driftwood9").await;
        let piper_id = app.user_id("piper").await;
        let sable_id = app.user_id("sable").await;

        let mine = app.seed_completed_content(piper_id, "Mine").await;
        let theirs = app.seed_completed_content(sable_id, "Theirs").await;

        let res = app
            .post_with_token(
                routes::CONTENTS_BY_UIDS,
                &json!({"uids": [mine.uid, theirs.uid, "missing"]}),
                &piper,
            )
            .await;

        assert_eq!(res.status, 200, "fetch failed: {}", res.text);
        let items = res.body.as_array().expect("array body");
        assert_eq!(items.len(), 2);
        for item in items {
            let expected_owned = item["uid"] == json!(mine.uid);
            assert_eq!(item["owned"], json!(expected_owned));
        }
    }

    #[tokio::test]
    async fn any_authenticated_user_can_read_a_content() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let piper_id = app.user_id("piper").await;
        let row = app.seed_completed_content(piper_id, "Shared reading").await;

        let res = app.get_with_token(&routes::content(&row.uid), &sable).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["title"], "Shared reading");
        assert_eq!(res.body["owned"], false);
    }
}

mod deletion {
    use super::*;

    #[tokio::test]
    async fn a_deleted_content_is_gone() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app.seed_completed_content(user_id, "Ephemeral").await;

        let res = app.delete_with_token(&routes::content(&row.uid), &token).await;
        assert_eq!(res.status, 204);

        let res = app.get_with_token(&routes::content(&row.uid), &token).await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn only_the_owner_can_delete() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let piper_id = app.user_id("piper").await;
        let row = app.seed_completed_content(piper_id, "Protected").await;

        let res = app.delete_with_token(&routes::content(&row.uid), &sable).await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }
}

mod counters {
    use super::*;

    #[tokio::test]
    async fn counting_a_view_increments_and_returns_the_page_url() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app.seed_completed_content(user_id, "Popular").await;

        let res = app
            .post_with_token(&routes::content_view(&row.uid), &json!({}), &token)
            .await;

        assert_eq!(res.status, 200, "view count failed: {}", res.text);
        assert_eq!(
            res.body["page_url"],
            json!(format!("http://localhost:3000/content/{}", row.uid))
        );
        assert_eq!(app.content_row(&row.uid).await.view_count, 1);
    }

    #[tokio::test]
    async fn share_counts_accumulate() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app.seed_completed_content(user_id, "Shared").await;

        for _ in 0..3 {
            let res = app
                .post_with_token(&routes::content_share(&row.uid), &json!({}), &token)
                .await;
            assert_eq!(res.status, 200, "share count failed: {}", res.text);
        }

        assert_eq!(app.content_row(&row.uid).await.share_count, 3);
    }

    #[tokio::test]
    async fn counting_an_unknown_content_fails() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(&routes::content_view("missing"), &json!({}), &token)
            .await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod retries {
    use super::*;

    #[tokio::test]
    async fn a_failed_content_can_be_retried() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app
            .seed_content(
                user_id,
                "Flaky",
                MediaType::Article,
                ProcessingStatus::Failed,
                RagStatus::WaitingInit,
            )
            .await;

        let res = app
            .post_with_token(&routes::content_retry(&row.uid), &json!({}), &token)
            .await;

        assert_eq!(res.status, 200, "retry failed: {}", res.text);
        assert_eq!(res.body["processing_status"], "PENDING");
        assert_eq!(res.body["rag_status"], "waiting_init");
        assert_eq!(app.content_row(&row.uid).await.attempt_generation, 1);
    }

    #[tokio::test]
    async fn only_failed_content_can_be_retried() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app.seed_completed_content(user_id, "Fine as is").await;

        let res = app
            .post_with_token(&routes::content_retry(&row.uid), &json!({}), &token)
            .await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn retrying_someone_elses_content_is_denied() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let piper_id = app.user_id("piper").await;
        let row = app
            .seed_content(
                piper_id,
                "Not yours",
                MediaType::Article,
                ProcessingStatus::Failed,
                RagStatus::WaitingInit,
            )
            .await;

        let res = app
            .post_with_token(&routes::content_retry(&row.uid), &json!({}), &sable)
            .await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }
}

mod audio_budget {
    use super::*;

    #[tokio::test]
    async fn the_quota_starts_empty() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app.get_with_token(routes::AUDIO_QUOTA, &token).await;

        assert_eq!(res.status, 200, "quota failed: {}", res.text);
        assert_eq!(res.body["used_seconds"], 0.0);
        assert_eq!(res.body["limit_seconds"], 1200.0);
        assert_eq!(res.body["allowed"], true);
    }

    #[tokio::test]
    async fn transcribed_audio_counts_against_the_quota() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        app.seed_audio_content(user_id, 900.0).await;
        app.seed_audio_content(user_id, 300.0).await;

        let res = app.get_with_token(routes::AUDIO_QUOTA, &token).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["used_seconds"], 1200.0);
        assert_eq!(res.body["allowed"], false);
    }

    #[tokio::test]
    async fn an_exhausted_quota_blocks_new_audio_batches() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        app.seed_audio_content(user_id, 1200.0).await;

        let res = app
            .post_with_token(
                routes::CONTENTS_BATCH,
                &json!({"items": [{"media_type": "audio", "file_name": "episode.mp3"}]}),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "TOTAL_AUDIO_EXCEEDS_DURATION_LIMIT");
    }

    #[tokio::test]
    async fn the_quota_only_counts_the_callers_audio() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let piper_id = app.user_id("piper").await;
        app.seed_audio_content(piper_id, 1200.0).await;

        let res = app.get_with_token(routes::AUDIO_QUOTA, &sable).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["used_seconds"], 0.0);
        assert_eq!(res.body["allowed"], true);
    }
}
