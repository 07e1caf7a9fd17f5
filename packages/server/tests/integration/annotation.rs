use serde_json::json;

use crate::common::{TestApp, routes};

fn w3c_note(text: &str) -> serde_json::Value {
    json!({
        "type": "Annotation",
        "body": {"type": "TextualBody", "value": text},
        "target": {"source": "https://example.com/posts/42"},
    })
}

mod creation {
    use super::*;

    #[tokio::test]
    async fn a_note_can_be_anchored_to_a_content() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let content = app.seed_completed_content(user_id, "Annotated").await;

        let res = app
            .post_with_token(
                routes::ANNOTATIONS,
                &json!({
                    "content_uid": content.uid,
                    "uid": "anno-1",
                    "annotation_content": w3c_note("worth rereading"),
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "create failed: {}", res.text);
        assert_eq!(res.body["uid"], "anno-1");
        assert_eq!(res.body["content"]["body"]["value"], "worth rereading");
        assert!(res.body["target_content_id"].is_number());
        assert!(res.body["created_at"].is_string());
    }

    #[tokio::test]
    async fn the_same_uid_cannot_be_used_twice() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let content = app.seed_completed_content(user_id, "Annotated").await;
        let payload = json!({
            "content_uid": content.uid,
            "uid": "anno-1",
            "annotation_content": w3c_note("first"),
        });

        let first = app.post_with_token(routes::ANNOTATIONS, &payload, &token).await;
        assert_eq!(first.status, 201, "create failed: {}", first.text);

        let second = app.post_with_token(routes::ANNOTATIONS, &payload, &token).await;
        assert_eq!(second.status, 409);
        assert_eq!(second.body["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn a_note_without_a_target_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let content = app.seed_completed_content(user_id, "Annotated").await;

        let res = app
            .post_with_token(
                routes::ANNOTATIONS,
                &json!({
                    "content_uid": content.uid,
                    "uid": "anno-1",
                    "annotation_content": {"type": "Annotation", "body": {}},
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn a_blank_uid_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let content = app.seed_completed_content(user_id, "Annotated").await;

        let res = app
            .post_with_token(
                routes::ANNOTATIONS,
                &json!({
                    "content_uid": content.uid,
                    "uid": "   ",
                    "annotation_content": w3c_note("no identity"),
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn a_note_on_an_unknown_content_fails() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(
                routes::ANNOTATIONS,
                &json!({
                    "content_uid": "missing",
                    "uid": "anno-1",
                    "annotation_content": w3c_note("orphan"),
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn notes_come_back_with_author_details() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let content = app.seed_completed_content(user_id, "Annotated").await;

        for (uid, text) in [("anno-1", "first"), ("anno-2", "second")] {
            let res = app
                .post_with_token(
                    routes::ANNOTATIONS,
                    &json!({
                        "content_uid": content.uid,
                        "uid": uid,
                        "annotation_content": w3c_note(text),
                    }),
                    &token,
                )
                .await;
            assert_eq!(res.status, 201, "create failed: {}", res.text);
        }

        let res = app
            .get_with_token(&routes::content_annotations(&content.uid), &token)
            .await;

        assert_eq!(res.status, 200, "list failed: {}", res.text);
        assert_eq!(res.body["content_uid"], json!(content.uid));
        let notes = res.body["annotations"].as_array().expect("annotations");
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0]["body"]["value"], "first");
        assert_eq!(notes[0]["nickname"], "piper");
        assert!(notes[0]["create_time"].is_string());
    }

    #[tokio::test]
    async fn any_reader_can_list_the_notes() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let piper_id = app.user_id("piper").await;
        let content = app.seed_completed_content(piper_id, "Annotated").await;

        let res = app
            .post_with_token(
                routes::ANNOTATIONS,
                &json!({
                    "content_uid": content.uid,
                    "uid": "anno-1",
                    "annotation_content": w3c_note("public margin"),
                }),
                &piper,
            )
            .await;
        assert_eq!(res.status, 201, "create failed: {}", res.text);

        let res = app
            .get_with_token(&routes::content_annotations(&content.uid), &sable)
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["annotations"].as_array().expect("annotations").len(), 1);
    }

    #[tokio::test]
    async fn an_unknown_content_yields_an_empty_list() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .get_with_token(&routes::content_annotations("missing"), &token)
            .await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["content_uid"], "missing");
        assert_eq!(res.body["annotations"], json!([]));
    }
}

mod updates {
    use super::*;

    #[tokio::test]
    async fn the_author_can_replace_a_note() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let content = app.seed_completed_content(user_id, "Annotated").await;

        let res = app
            .post_with_token(
                routes::ANNOTATIONS,
                &json!({
                    "content_uid": content.uid,
                    "uid": "anno-1",
                    "annotation_content": w3c_note("draft"),
                }),
                &token,
            )
            .await;
        assert_eq!(res.status, 201, "create failed: {}", res.text);

        let res = app
            .patch_with_token(
                &routes::annotation("anno-1"),
                &json!({
                    "content_uid": content.uid,
                    "annotation_content": w3c_note("final"),
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "update failed: {}", res.text);
        assert_eq!(res.body["uid"], "anno-1");
        assert_eq!(res.body["content"]["body"]["value"], "final");
    }

    #[tokio::test]
    async fn someone_elses_note_cannot_be_changed() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let piper_id = app.user_id("piper").await;
        let content = app.seed_completed_content(piper_id, "Annotated").await;

        let res = app
            .post_with_token(
                routes::ANNOTATIONS,
                &json!({
                    "content_uid": content.uid,
                    "uid": "anno-1",
                    "annotation_content": w3c_note("mine"),
                }),
                &piper,
            )
            .await;
        assert_eq!(res.status, 201, "create failed: {}", res.text);

        let res = app
            .patch_with_token(
                &routes::annotation("anno-1"),
                &json!({
                    "content_uid": content.uid,
                    "annotation_content": w3c_note("hijacked"),
                }),
                &sable,
            )
            .await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn the_note_must_belong_to_the_named_content() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let first = app.seed_completed_content(user_id, "First").await;
        let second = app.seed_completed_content(user_id, "Second").await;

        let res = app
            .post_with_token(
                routes::ANNOTATIONS,
                &json!({
                    "content_uid": first.uid,
                    "uid": "anno-1",
                    "annotation_content": w3c_note("on the first"),
                }),
                &token,
            )
            .await;
        assert_eq!(res.status, 201, "create failed: {}", res.text);

        let res = app
            .patch_with_token(
                &routes::annotation("anno-1"),
                &json!({
                    "content_uid": second.uid,
                    "annotation_content": w3c_note("moved?"),
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn an_unknown_note_cannot_be_updated() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let content = app.seed_completed_content(user_id, "Annotated").await;

        let res = app
            .patch_with_token(
                &routes::annotation("missing"),
                &json!({
                    "content_uid": content.uid,
                    "annotation_content": w3c_note("ghost"),
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod deletion {
    use super::*;

    #[tokio::test]
    async fn the_author_can_delete_their_note() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let content = app.seed_completed_content(user_id, "Annotated").await;

        let res = app
            .post_with_token(
                routes::ANNOTATIONS,
                &json!({
                    "content_uid": content.uid,
                    "uid": "anno-1",
                    "annotation_content": w3c_note("temporary"),
                }),
                &token,
            )
            .await;
        assert_eq!(res.status, 201, "create failed: {}", res.text);

        let res = app.delete_with_token(&routes::annotation("anno-1"), &token).await;
        assert_eq!(res.status, 204);

        let res = app
            .get_with_token(&routes::content_annotations(&content.uid), &token)
            .await;
        assert_eq!(res.body["annotations"], json!([]));
    }

    #[tokio::test]
    async fn someone_elses_note_cannot_be_deleted() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let piper_id = app.user_id("piper").await;
        let content = app.seed_completed_content(piper_id, "Annotated").await;

        let res = app
            .post_with_token(
                routes::ANNOTATIONS,
                &json!({
                    "content_uid": content.uid,
                    "uid": "anno-1",
                    "annotation_content": w3c_note("mine"),
                }),
                &piper,
            )
            .await;
        assert_eq!(res.status, 201, "create failed: {}", res.text);

        let res = app.delete_with_token(&routes::annotation("anno-1"), &sable).await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }
}
