use common::{MediaType, ProcessingStatus, RagStatus};
use serde_json::json;

use crate::common::{TestApp, routes};

const ANALYZING: &str = "Some content still analyzing. Current answers are limited to ready data.";
const NOT_READY: &str =
    "Content not ready yet. First-time setup in progress. Please check back shortly.";

mod availability {
    use super::*;

    #[tokio::test]
    async fn an_empty_inbox_is_unavailable() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .get_with_token(
                &format!("{}?chat_start_type=inbox", routes::CHAT_STATUS),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "status failed: {}", res.text);
        assert_eq!(res.body["status"], "unavailable");
        assert_eq!(res.body["message"], ANALYZING);
    }

    #[tokio::test]
    async fn a_fully_indexed_inbox_is_available() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        app.seed_completed_content(user_id, "Indexed").await;

        let res = app
            .get_with_token(
                &format!("{}?chat_start_type=inbox", routes::CHAT_STATUS),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "status failed: {}", res.text);
        assert_eq!(res.body["status"], "available");
        assert_eq!(res.body["message"], "");
    }

    #[tokio::test]
    async fn an_inbox_with_indexing_still_running_is_partially_available() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        app.seed_completed_content(user_id, "Indexed").await;
        app.seed_content(
            user_id,
            "Still indexing",
            MediaType::Article,
            ProcessingStatus::Completed,
            RagStatus::Processing,
        )
        .await;

        let res = app
            .get_with_token(
                &format!("{}?chat_start_type=inbox", routes::CHAT_STATUS),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "status failed: {}", res.text);
        assert_eq!(res.body["status"], "partially_available");
        assert_eq!(res.body["message"], ANALYZING);
    }

    #[tokio::test]
    async fn an_unindexed_article_is_unavailable() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app
            .seed_content(
                user_id,
                "Still indexing",
                MediaType::Article,
                ProcessingStatus::Completed,
                RagStatus::Processing,
            )
            .await;

        let res = app
            .get_with_token(
                &format!(
                    "{}?chat_start_type=article&content_uid={}",
                    routes::CHAT_STATUS,
                    row.uid
                ),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "status failed: {}", res.text);
        assert_eq!(res.body["status"], "unavailable");
        assert_eq!(res.body["message"], ANALYZING);
    }

    #[tokio::test]
    async fn an_indexed_article_is_available() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app.seed_completed_content(user_id, "Indexed").await;

        let res = app
            .get_with_token(
                &format!(
                    "{}?chat_start_type=article&content_uid={}",
                    routes::CHAT_STATUS,
                    row.uid
                ),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "status failed: {}", res.text);
        assert_eq!(res.body["status"], "available");
    }

    #[tokio::test]
    async fn a_knowledge_base_chat_requires_the_base_id() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .get_with_token(
                &format!("{}?chat_start_type=single_knowledge_base", routes::CHAT_STATUS),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "status failed: {}", res.text);
        assert_eq!(res.body["status"], "unavailable");
    }

    #[tokio::test]
    async fn a_populated_knowledge_base_is_available() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let kb_uid = app.create_kb(&token, "Reading list", "private").await;
        let row = app.seed_completed_content(user_id, "Indexed").await;

        let res = app
            .post_with_token(
                &routes::kb_contents(&kb_uid),
                &json!({"content_uids": [row.uid]}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "attach failed: {}", res.text);

        let res = app
            .get_with_token(
                &format!(
                    "{}?chat_start_type=single_knowledge_base&kb_uid={kb_uid}",
                    routes::CHAT_STATUS
                ),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "status failed: {}", res.text);
        assert_eq!(res.body["status"], "available");
        assert_eq!(res.body["message"], "");
    }

    #[tokio::test]
    async fn the_knowledge_bases_scope_without_bases_is_unavailable() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .get_with_token(
                &format!("{}?chat_start_type=my_knowledge_bases", routes::CHAT_STATUS),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "status failed: {}", res.text);
        assert_eq!(res.body["status"], "unavailable");
    }
}

mod streaming {
    use super::*;

    fn single_frame(text: &str) -> serde_json::Value {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let frame = lines.next().expect("at least one frame");
        assert!(lines.next().is_none(), "expected exactly one frame, got: {text}");
        serde_json::from_str(frame).expect("frame is valid JSON")
    }

    #[tokio::test]
    async fn an_empty_question_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(
                routes::CHAT_STREAM,
                &json!({"question": "   ", "msg_id": "m-1", "chat_start_type": "inbox"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn a_blank_message_id_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(
                routes::CHAT_STREAM,
                &json!({"question": "what did I save?", "msg_id": "", "chat_start_type": "inbox"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn an_empty_inbox_streams_a_single_error_frame() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(
                routes::CHAT_STREAM,
                &json!({"question": "what did I save?", "msg_id": "m-1", "chat_start_type": "inbox"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "stream failed: {}", res.text);
        let frame = single_frame(&res.text);
        assert_eq!(frame["msg_id"], "m-1");
        assert_eq!(frame["status"], "error");
        assert_eq!(frame["error_message"], NOT_READY);
        assert_eq!(frame["content"], serde_json::Value::Null);
        assert_eq!(frame["followup_question"], json!([]));
    }

    #[tokio::test]
    async fn an_unready_article_reports_why() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let row = app
            .seed_content(
                user_id,
                "Still indexing",
                MediaType::Article,
                ProcessingStatus::Completed,
                RagStatus::Processing,
            )
            .await;

        let res = app
            .post_with_token(
                routes::CHAT_STREAM,
                &json!({
                    "question": "summarize this",
                    "msg_id": "m-2",
                    "chat_start_type": "article",
                    "content_uid": row.uid,
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "stream failed: {}", res.text);
        let frame = single_frame(&res.text);
        assert_eq!(frame["status"], "error");
        assert_eq!(frame["error_message"], "Content is not ready for chat");
    }
}
