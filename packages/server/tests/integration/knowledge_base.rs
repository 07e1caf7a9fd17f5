use serde_json::json;

use crate::common::{TestApp, routes};

mod creation {
    use super::*;

    #[tokio::test]
    async fn a_new_base_defaults_to_private() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(
                routes::KBS,
                &json!({"name": "Reading list", "description": "Long reads"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "create failed: {}", res.text);
        assert!(res.body["uid"].is_string());
        assert_eq!(res.body["name"], "Reading list");
        assert_eq!(res.body["description"], "Long reads");
        assert_eq!(res.body["visibility"], "private");
        assert_eq!(res.body["subscriber_count"], 0);
        assert_eq!(res.body["content_count"], 0);
        assert_eq!(res.body["owned"], true);
        assert_eq!(res.body["subscribed"], false);
        assert_eq!(res.body["user_name"], "piper");
        assert!(res.body["share_page_url"].is_null());
    }

    #[tokio::test]
    async fn a_public_base_carries_a_share_link() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(
                routes::KBS,
                &json!({"name": "Open shelf", "visibility": "public"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "create failed: {}", res.text);
        let uid = res.body["uid"].as_str().expect("uid");
        assert_eq!(
            res.body["share_page_url"],
            json!(format!("http://localhost:3000/kb/{uid}"))
        );
    }

    #[tokio::test]
    async fn a_blank_name_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;

        let res = app
            .post_with_token(routes::KBS, &json!({"name": "   "}), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn own_bases_come_back_newest_first() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        app.create_kb(&token, "Older", "private").await;
        let newer = app.create_kb(&token, "Newer", "private").await;

        let res = app.get_with_token(routes::KBS, &token).await;

        assert_eq!(res.status, 200, "list failed: {}", res.text);
        assert_eq!(res.body["total"], 2);
        let items = res.body["knowledge_bases"].as_array().expect("list");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["uid"], json!(newer));
        assert_eq!(items[0]["name"], "Newer");
    }

    #[tokio::test]
    async fn exploring_shows_only_other_users_public_bases() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        app.create_kb(&piper, "Piper public", "public").await;
        app.create_kb(&piper, "Piper private", "private").await;
        app.create_kb(&sable, "Sable public", "public").await;

        let res = app.get_with_token(routes::KBS_OTHERS, &sable).await;

        assert_eq!(res.status, 200, "explore failed: {}", res.text);
        assert_eq!(res.body["total"], 1);
        let items = res.body["knowledge_bases"].as_array().expect("list");
        assert_eq!(items[0]["name"], "Piper public");
        assert_eq!(items[0]["owned"], false);
    }

    #[tokio::test]
    async fn subscriptions_list_the_bases_subscribed_to() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let kb_uid = app.create_kb(&piper, "Piper public", "public").await;

        let res = app
            .post_with_token(&routes::kb_subscribe(&kb_uid), &json!({}), &sable)
            .await;
        assert_eq!(res.status, 204, "subscribe failed: {}", res.text);

        let res = app.get_with_token(routes::KBS_SUBSCRIPTIONS, &sable).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["total"], 1);
        let items = res.body["knowledge_bases"].as_array().expect("list");
        assert_eq!(items[0]["uid"], json!(kb_uid));
        assert_eq!(items[0]["subscribed"], true);
        assert_eq!(items[0]["owned"], false);
    }
}

mod visibility {
    use super::*;

    #[tokio::test]
    async fn a_private_base_is_hidden_from_other_users() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let kb_uid = app.create_kb(&piper, "Secret shelf", "private").await;

        let own = app.get_with_token(&routes::kb(&kb_uid), &piper).await;
        assert_eq!(own.status, 200);
        assert_eq!(own.body["owned"], true);

        let other = app.get_with_token(&routes::kb(&kb_uid), &sable).await;
        assert_eq!(other.status, 404);
        assert_eq!(other.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn a_public_base_is_readable_by_anyone() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let kb_uid = app.create_kb(&piper, "Open shelf", "public").await;

        let res = app.get_with_token(&routes::kb(&kb_uid), &sable).await;

        assert_eq!(res.status, 200, "get failed: {}", res.text);
        assert_eq!(res.body["name"], "Open shelf");
        assert_eq!(res.body["owned"], false);
        assert_eq!(res.body["user_name"], "piper");
    }

    #[tokio::test]
    async fn the_owner_can_rename_a_base() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let kb_uid = app.create_kb(&token, "Drafts", "private").await;

        let res = app
            .patch_with_token(&routes::kb(&kb_uid), &json!({"name": "Archive"}), &token)
            .await;

        assert_eq!(res.status, 200, "update failed: {}", res.text);
        assert_eq!(res.body["name"], "Archive");
        assert_eq!(res.body["visibility"], "private");
    }

    #[tokio::test]
    async fn a_base_with_subscribers_cannot_go_private() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let kb_uid = app.create_kb(&piper, "Open shelf", "public").await;

        let res = app
            .post_with_token(&routes::kb_subscribe(&kb_uid), &json!({}), &sable)
            .await;
        assert_eq!(res.status, 204, "subscribe failed: {}", res.text);

        let res = app
            .patch_with_token(&routes::kb(&kb_uid), &json!({"visibility": "private"}), &piper)
            .await;
        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "CONFLICT");

        let res = app.delete_with_token(&routes::kb_subscribe(&kb_uid), &sable).await;
        assert_eq!(res.status, 204);

        let res = app
            .patch_with_token(&routes::kb(&kb_uid), &json!({"visibility": "private"}), &piper)
            .await;
        assert_eq!(res.status, 200, "update failed: {}", res.text);
        assert_eq!(res.body["visibility"], "private");
    }
}

mod subscriptions {
    use super::*;

    #[tokio::test]
    async fn subscribing_bumps_the_subscriber_count() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let kb_uid = app.create_kb(&piper, "Open shelf", "public").await;

        let res = app
            .post_with_token(&routes::kb_subscribe(&kb_uid), &json!({}), &sable)
            .await;
        assert_eq!(res.status, 204, "subscribe failed: {}", res.text);

        let res = app.get_with_token(&routes::kb(&kb_uid), &sable).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["subscriber_count"], 1);
        assert_eq!(res.body["subscribed"], true);
    }

    #[tokio::test]
    async fn subscribing_twice_is_a_no_op() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let kb_uid = app.create_kb(&piper, "Open shelf", "public").await;

        for _ in 0..2 {
            let res = app
                .post_with_token(&routes::kb_subscribe(&kb_uid), &json!({}), &sable)
                .await;
            assert_eq!(res.status, 204, "subscribe failed: {}", res.text);
        }

        let res = app.get_with_token(&routes::kb(&kb_uid), &piper).await;
        assert_eq!(res.body["subscriber_count"], 1);
    }

    #[tokio::test]
    async fn the_owner_cannot_subscribe_to_their_own_base() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let kb_uid = app.create_kb(&token, "Open shelf", "public").await;

        let res = app
            .post_with_token(&routes::kb_subscribe(&kb_uid), &json!({}), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unsubscribing_without_a_subscription_fails() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let kb_uid = app.create_kb(&piper, "Open shelf", "public").await;

        let res = app.delete_with_token(&routes::kb_subscribe(&kb_uid), &sable).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn a_cancelled_subscription_can_be_renewed() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let kb_uid = app.create_kb(&piper, "Open shelf", "public").await;

        let res = app
            .post_with_token(&routes::kb_subscribe(&kb_uid), &json!({}), &sable)
            .await;
        assert_eq!(res.status, 204, "subscribe failed: {}", res.text);
        let res = app.delete_with_token(&routes::kb_subscribe(&kb_uid), &sable).await;
        assert_eq!(res.status, 204);
        let res = app
            .post_with_token(&routes::kb_subscribe(&kb_uid), &json!({}), &sable)
            .await;
        assert_eq!(res.status, 204);

        let res = app.get_with_token(&routes::kb(&kb_uid), &sable).await;
        assert_eq!(res.body["subscribed"], true);
        assert_eq!(res.body["subscriber_count"], 1);
    }
}

mod contents {
    use super::*;

    #[tokio::test]
    async fn attaching_counts_only_own_existing_contents() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let kb_uid = app.create_kb(&token, "Reading list", "private").await;
        let first = app.seed_completed_content(user_id, "First").await;
        let second = app.seed_completed_content(user_id, "Second").await;
        let gone = app.seed_completed_content(user_id, "Gone").await;

        let res = app.delete_with_token(&routes::content(&gone.uid), &token).await;
        assert_eq!(res.status, 204);

        let res = app
            .post_with_token(
                &routes::kb_contents(&kb_uid),
                &json!({"content_uids": [first.uid, second.uid, gone.uid]}),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "attach failed: {}", res.text);
        assert_eq!(res.body["total"], 3);
        assert_eq!(res.body["added"], 2);
    }

    #[tokio::test]
    async fn unknown_uids_are_skipped() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let kb_uid = app.create_kb(&token, "Reading list", "private").await;
        let row = app.seed_completed_content(user_id, "Only one").await;

        let res = app
            .post_with_token(
                &routes::kb_contents(&kb_uid),
                &json!({"content_uids": [row.uid, "missing"]}),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "attach failed: {}", res.text);
        assert_eq!(res.body["total"], 2);
        assert_eq!(res.body["added"], 1);
    }

    #[tokio::test]
    async fn attaching_the_same_content_again_is_idempotent() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let kb_uid = app.create_kb(&token, "Reading list", "private").await;
        let row = app.seed_completed_content(user_id, "Keeper").await;

        for _ in 0..2 {
            let res = app
                .post_with_token(
                    &routes::kb_contents(&kb_uid),
                    &json!({"content_uids": [row.uid]}),
                    &token,
                )
                .await;
            assert_eq!(res.status, 200, "attach failed: {}", res.text);
        }

        let res = app.get_with_token(&routes::kb_contents(&kb_uid), &token).await;
        assert_eq!(res.body["total"], 1);
    }

    #[tokio::test]
    async fn someone_elses_content_cannot_be_attached() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        app.create_authenticated_user("sable", "driftwood9").await;
        let sable_id = app.user_id("sable").await;
        let kb_uid = app.create_kb(&piper, "Reading list", "private").await;
        let row = app.seed_completed_content(sable_id, "Sable's find").await;

        let res = app
            .post_with_token(
                &routes::kb_contents(&kb_uid),
                &json!({"content_uids": [row.uid]}),
                &piper,
            )
            .await;

        assert_eq!(res.status, 200, "attach failed: {}", res.text);
        assert_eq!(res.body["added"], 0);
    }

    #[tokio::test]
    async fn detaching_removes_the_link_exactly_once() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let kb_uid = app.create_kb(&token, "Reading list", "private").await;
        let row = app.seed_completed_content(user_id, "Passing through").await;

        let res = app
            .post_with_token(
                &routes::kb_contents(&kb_uid),
                &json!({"content_uids": [row.uid]}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "attach failed: {}", res.text);

        let res = app
            .delete_with_token(&routes::kb_content(&kb_uid, &row.uid), &token)
            .await;
        assert_eq!(res.status, 204);

        let res = app
            .delete_with_token(&routes::kb_content(&kb_uid, &row.uid), &token)
            .await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn anyone_who_can_see_the_base_can_list_its_contents() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let piper_id = app.user_id("piper").await;
        let kb_uid = app.create_kb(&piper, "Open shelf", "public").await;
        let row = app.seed_completed_content(piper_id, "On display").await;

        let res = app
            .post_with_token(
                &routes::kb_contents(&kb_uid),
                &json!({"content_uids": [row.uid]}),
                &piper,
            )
            .await;
        assert_eq!(res.status, 200, "attach failed: {}", res.text);

        let res = app.get_with_token(&routes::kb_contents(&kb_uid), &sable).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["total"], 1);
        assert_eq!(res.body["items"][0]["uid"], json!(row.uid));
        assert_eq!(res.body["items"][0]["owned"], false);
    }

    #[tokio::test]
    async fn the_picker_flags_contents_already_in_the_base() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let user_id = app.user_id("piper").await;
        let kb_uid = app.create_kb(&token, "Reading list", "private").await;
        let linked = app.seed_completed_content(user_id, "Linked").await;
        let loose = app.seed_completed_content(user_id, "Loose").await;

        let res = app
            .post_with_token(
                &routes::kb_contents(&kb_uid),
                &json!({"content_uids": [linked.uid]}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "attach failed: {}", res.text);

        let res = app
            .get_with_token(&routes::kb_available_contents(&kb_uid), &token)
            .await;
        assert_eq!(res.status, 200, "picker failed: {}", res.text);
        let items = res.body.as_array().expect("array body");
        assert_eq!(items.len(), 2);
        for item in items {
            let expected = item["uid"] == json!(linked.uid);
            assert_eq!(item["in_knowledge_base"], json!(expected));
        }
        assert!(items.iter().any(|item| item["uid"] == json!(loose.uid)));
    }

    #[tokio::test]
    async fn the_picker_is_owner_only() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let kb_uid = app.create_kb(&piper, "Open shelf", "public").await;

        let res = app
            .get_with_token(&routes::kb_available_contents(&kb_uid), &sable)
            .await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod deletion {
    use super::*;

    #[tokio::test]
    async fn a_deleted_base_is_gone() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("piper", "driftwood9").await;
        let kb_uid = app.create_kb(&token, "Short lived", "private").await;

        let res = app.delete_with_token(&routes::kb(&kb_uid), &token).await;
        assert_eq!(res.status, 204);

        let res = app.get_with_token(&routes::kb(&kb_uid), &token).await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn only_the_owner_can_delete_a_base() {
        let app = TestApp::spawn().await;
        let piper = app.create_authenticated_user("piper", "driftwood9").await;
        let sable = app.create_authenticated_user("sable", "driftwood9").await;
        let kb_uid = app.create_kb(&piper, "Open shelf", "public").await;

        let res = app.delete_with_token(&routes::kb(&kb_uid), &sable).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}
