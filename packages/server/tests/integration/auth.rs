use serde_json::json;

use crate::common::{TestApp, TestResponse, routes};

mod registration {
    use super::*;

    #[tokio::test]
    async fn registering_returns_the_new_user_id() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                routes::REGISTER,
                &json!({"username": "nadia_reads", "password": "paper-lantern-42"}),
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert!(res.body["id"].is_number());
        assert_eq!(res.body["username"], "nadia_reads");
    }

    #[tokio::test]
    async fn username_is_trimmed_before_storing() {
        let app = TestApp::spawn().await;

        let reg = app
            .post_without_token(
                routes::REGISTER,
                &json!({"username": "  nadia  ", "password": "paper-lantern-42"}),
            )
            .await;
        assert_eq!(reg.status, 201, "{}", reg.text);
        assert_eq!(reg.body["username"], "nadia");

        let login = app
            .post_without_token(
                routes::LOGIN,
                &json!({"username": "nadia", "password": "paper-lantern-42"}),
            )
            .await;
        assert_eq!(login.status, 200, "{}", login.text);
    }

    #[tokio::test]
    async fn duplicate_usernames_conflict() {
        let app = TestApp::spawn().await;
        let body = json!({"username": "nadia_reads", "password": "paper-lantern-42"});

        let first = app.post_without_token(routes::REGISTER, &body).await;
        assert_eq!(first.status, 201, "{}", first.text);

        let second = app.post_without_token(routes::REGISTER, &body).await;
        assert_eq!(second.status, 409);
        assert_eq!(second.body["code"], "USERNAME_TAKEN");
    }

    #[tokio::test]
    async fn underscores_are_allowed_spaces_are_not() {
        let app = TestApp::spawn().await;

        let ok = app
            .post_without_token(
                routes::REGISTER,
                &json!({"username": "field_notes", "password": "quiet-harbor-9"}),
            )
            .await;
        assert_eq!(ok.status, 201, "{}", ok.text);

        let bad = app
            .post_without_token(
                routes::REGISTER,
                &json!({"username": "field notes", "password": "quiet-harbor-9"}),
            )
            .await;
        assert_eq!(bad.status, 400);
        assert_eq!(bad.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn password_length_is_bounded() {
        let app = TestApp::spawn().await;
        let over_limit = "p".repeat(129);
        let cases = [
            ("seven77", 400),
            ("eight888", 201),
            (over_limit.as_str(), 400),
        ];

        for (i, (password, expected)) in cases.into_iter().enumerate() {
            let res = app
                .post_without_token(
                    routes::REGISTER,
                    &json!({"username": format!("reader{i}"), "password": password}),
                )
                .await;
            assert_eq!(res.status, expected, "password of {} bytes", password.len());
        }
    }

    #[tokio::test]
    async fn username_length_is_bounded() {
        let app = TestApp::spawn().await;

        for username in ["   ", &"u".repeat(33)] {
            let res = app
                .post_without_token(
                    routes::REGISTER,
                    &json!({"username": username, "password": "paper-lantern-42"}),
                )
                .await;
            assert_eq!(res.status, 400, "username {username:?}");
            assert_eq!(res.body["code"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn blank_nickname_is_stored_as_null() {
        let app = TestApp::spawn().await;
        let body = json!({
            "username": "marrow",
            "password": "quiet-harbor-9",
            "nickname": "   ",
        });

        let reg = app.post_without_token(routes::REGISTER, &body).await;
        assert_eq!(reg.status, 201, "{}", reg.text);

        let login = app.post_without_token(routes::LOGIN, &body).await;
        let token = login.body["token"].as_str().expect("token");

        let me = app.get_with_token(routes::ME, token).await;
        assert_eq!(me.status, 200);
        assert!(me.body["nickname"].is_null());
    }

    #[tokio::test]
    async fn overlong_nickname_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                routes::REGISTER,
                &json!({
                    "username": "marrow",
                    "password": "quiet-harbor-9",
                    "nickname": "n".repeat(65),
                }),
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn missing_password_field_is_a_validation_error() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(routes::REGISTER, &json!({"username": "nadia_reads"}))
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn garbage_body_is_a_validation_error() {
        let app = TestApp::spawn().await;

        let raw = app
            .client
            .post(format!("http://{}{}", app.addr, routes::REGISTER))
            .header("Content-Type", "application/json")
            .body("{\"username\": ")
            .send()
            .await
            .expect("request should reach the server");
        let res = TestResponse::from_response(raw).await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod login {
    use super::*;

    #[tokio::test]
    async fn valid_credentials_return_a_bearer_token() {
        let app = TestApp::spawn().await;
        let body = json!({"username": "nadia_reads", "password": "paper-lantern-42"});

        let reg = app.post_without_token(routes::REGISTER, &body).await;
        assert_eq!(reg.status, 201, "{}", reg.text);

        let res = app.post_without_token(routes::LOGIN, &body).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert!(res.body["token"].is_string());
        assert_eq!(res.body["username"], "nadia_reads");
    }

    #[tokio::test]
    async fn username_is_trimmed_at_login() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("nadia_reads", "paper-lantern-42")
            .await;

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({"username": "  nadia_reads  ", "password": "paper-lantern-42"}),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("nadia_reads", "paper-lantern-42")
            .await;

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({"username": "nadia_reads", "password": "paper-lantern-43"}),
            )
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn unknown_username_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({"username": "nobody_here", "password": "paper-lantern-42"}),
            )
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn empty_password_is_a_validation_error_not_a_401() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({"username": "nadia_reads", "password": ""}),
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod profile {
    use super::*;

    #[tokio::test]
    async fn profile_reflects_registration_fields() {
        let app = TestApp::spawn().await;
        let body = json!({
            "username": "nadia_reads",
            "password": "paper-lantern-42",
            "nickname": "Nadia",
        });

        let reg = app.post_without_token(routes::REGISTER, &body).await;
        assert_eq!(reg.status, 201, "{}", reg.text);
        let login = app.post_without_token(routes::LOGIN, &body).await;
        let token = login.body["token"].as_str().expect("token");

        let res = app.get_with_token(routes::ME, token).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["username"], "nadia_reads");
        assert_eq!(res.body["nickname"], "Nadia");
        assert!(res.body["id"].is_number());
        assert!(res.body["avatar"].is_null());
    }

    #[tokio::test]
    async fn profile_requires_a_token() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(routes::ME).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app.get_with_token(routes::ME, "definitely.not.jwt").await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("nadia_reads", "paper-lantern-42")
            .await;

        let res = app.get_with_token(routes::ME, &format!("{token}x")).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_rejected() {
        let app = TestApp::spawn().await;

        let raw = app
            .client
            .get(format!("http://{}{}", app.addr, routes::ME))
            .header("Authorization", "Basic bmFkaWE6cGFwZXI=")
            .send()
            .await
            .expect("request should reach the server");
        let res = TestResponse::from_response(raw).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }
}
