use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use common::storage::LocalStore;
use common::{MediaType, ProcessingStatus, RagStatus};
use reqwest::Client;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};
use serde_json::Value;
use tempfile::TempDir;

use server::config::{
    AppConfig, AuthConfig, ClientsConfig, CorsConfig, DatabaseConfig, IngestConfig,
    KeyedClientConfig, LlmConfig, MqAppConfig, RagConfig, ReadabilityConfig, ServerConfig,
    StorageConfig,
};
use server::entity::{content, user};
use server::models::shared::new_uid;
use server::state::{AppState, ClientSet};

pub mod routes {
    pub const REGISTER: &str = "/api/v1/auth/register";
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const ME: &str = "/api/v1/auth/me";

    pub const CONTENTS: &str = "/api/v1/contents";
    pub const CONTENTS_BATCH: &str = "/api/v1/contents/batch";
    pub const CONTENTS_UPLOAD: &str = "/api/v1/contents/upload";
    pub const CONTENTS_BY_UIDS: &str = "/api/v1/contents/uids";
    pub const AUDIO_QUOTA: &str = "/api/v1/contents/audio-quota";

    pub fn content(uid: &str) -> String {
        format!("/api/v1/contents/{uid}")
    }

    pub fn content_upload(uid: &str) -> String {
        format!("/api/v1/contents/{uid}/upload")
    }

    pub fn content_retry(uid: &str) -> String {
        format!("/api/v1/contents/{uid}/retry")
    }

    pub fn content_view(uid: &str) -> String {
        format!("/api/v1/contents/{uid}/view")
    }

    pub fn content_share(uid: &str) -> String {
        format!("/api/v1/contents/{uid}/share")
    }

    pub fn content_annotations(uid: &str) -> String {
        format!("/api/v1/contents/{uid}/annotations")
    }

    pub const KBS: &str = "/api/v1/kbs";
    pub const KBS_OTHERS: &str = "/api/v1/kbs/others";
    pub const KBS_SUBSCRIPTIONS: &str = "/api/v1/kbs/subscriptions";

    pub fn kb(uid: &str) -> String {
        format!("/api/v1/kbs/{uid}")
    }

    pub fn kb_contents(uid: &str) -> String {
        format!("/api/v1/kbs/{uid}/contents")
    }

    pub fn kb_content(uid: &str, content_uid: &str) -> String {
        format!("/api/v1/kbs/{uid}/contents/{content_uid}")
    }

    pub fn kb_available_contents(uid: &str) -> String {
        format!("/api/v1/kbs/{uid}/available-contents")
    }

    pub fn kb_subscribe(uid: &str) -> String {
        format!("/api/v1/kbs/{uid}/subscribe")
    }

    pub const ANNOTATIONS: &str = "/api/v1/annotations";

    pub fn annotation(uid: &str) -> String {
        format!("/api/v1/annotations/{uid}")
    }

    pub const CHAT_STREAM: &str = "/api/v1/chat/stream";
    pub const CHAT_STATUS: &str = "/api/v1/chat/status";
}

/// A running test server.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    /// Root of the local object store; removed when the app is dropped.
    _storage_dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

/// Client endpoints pointed at a closed local port, so code paths that try
/// to call out fail fast instead of hanging a test.
fn test_clients_config() -> ClientsConfig {
    ClientsConfig {
        readability: ReadabilityConfig {
            base_url: "http://127.0.0.1:9".to_string(),
        },
        youtube: KeyedClientConfig {
            api_key: "test".to_string(),
        },
        transcripts: KeyedClientConfig {
            api_key: "test".to_string(),
        },
        spotify: KeyedClientConfig {
            api_key: "test".to_string(),
        },
        twitter: KeyedClientConfig {
            api_key: "test".to_string(),
        },
        asr: KeyedClientConfig {
            api_key: "test".to_string(),
        },
        llm: LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "test".to_string(),
            model: "test-model".to_string(),
        },
        rag: RagConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "test".to_string(),
            embedding_model: "test-embedding".to_string(),
        },
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        // Every new in-memory SQLite connection is a fresh database, so the
        // pool must hold exactly one connection for the app's lifetime.
        opts.max_connections(1).min_connections(1);
        let db = Database::connect(opts)
            .await
            .expect("Failed to connect to in-memory database");
        server::database::create_tables(&db)
            .await
            .expect("Failed to create tables");

        let storage_dir = TempDir::new().expect("Failed to create storage directory");

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
                content_page_url: "http://localhost:3000/content".to_string(),
                kb_share_page_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: "test-secret-for-integration-tests".to_string(),
            },
            storage: StorageConfig {
                backend: "local".to_string(),
                root: storage_dir.path().display().to_string(),
                url_prefix: "http://localhost:3000/api/v1/files".to_string(),
                ..Default::default()
            },
            mq: MqAppConfig {
                enabled: false,
                ..Default::default()
            },
            ingest: IngestConfig {
                max_upload_bytes: 10 * 1024 * 1024,
                single_audio_max_seconds: 600.0,
                total_audio_max_seconds: 1200.0,
                batch_max_items: 10,
                subtitle_merge_seconds: 30.0,
                stale_sweep_interval_secs: 3600,
                stale_after_secs: 600,
                stale_sweep_limit: 100,
            },
            clients: test_clients_config(),
        };

        let storage = LocalStore::new(
            storage_dir.path().to_path_buf(),
            app_config.storage.url_prefix.clone(),
        )
        .await
        .expect("Failed to create local store");
        let clients = ClientSet::from_config(&app_config.clients).expect("Failed to build clients");

        let state = AppState {
            config: Arc::new(app_config),
            db: db.clone(),
            mq: None,
            storage: Arc::new(storage),
            clients: Arc::new(clients),
        };

        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            _storage_dir: storage_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_without_token(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn patch_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .patch(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send PATCH request");

        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    pub async fn upload_with_token(
        &self,
        path: &str,
        file_name: &str,
        file_bytes: Vec<u8>,
        media_type: Option<&str>,
        token: &str,
    ) -> TestResponse {
        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .expect("Failed to set MIME type");
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(media_type) = media_type {
            form = form.text("media_type", media_type.to_string());
        }

        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }

    /// Register a user and log in, returning the auth token.
    pub async fn create_authenticated_user(&self, username: &str, password: &str) -> String {
        let body = serde_json::json!({
            "username": username,
            "password": password,
        });

        let reg = self.post_without_token(routes::REGISTER, &body).await;
        assert_eq!(reg.status, 201, "Registration failed: {}", reg.text);

        let res = self.post_without_token(routes::LOGIN, &body).await;
        assert_eq!(res.status, 200, "Login failed: {}", res.text);

        res.body["token"]
            .as_str()
            .expect("Login response should contain a token")
            .to_string()
    }

    /// Look up a registered user's database id by username.
    pub async fn user_id(&self, username: &str) -> i32 {
        user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await
            .expect("DB query failed")
            .expect("User not found")
            .id
    }

    /// Create a knowledge base via the API and return its `uid`.
    pub async fn create_kb(&self, token: &str, name: &str, visibility: &str) -> String {
        let res = self
            .post_with_token(
                routes::KBS,
                &serde_json::json!({
                    "name": name,
                    "description": "Test knowledge base",
                    "visibility": visibility,
                }),
                token,
            )
            .await;
        assert_eq!(res.status, 201, "create_kb failed: {}", res.text);
        res.uid()
    }

    /// Insert a content row directly, as the extraction pipeline would have
    /// left it. Rows whose retrieval status has moved past `waiting_init`
    /// carry dataset linkage.
    pub async fn seed_content(
        &self,
        user_id: i32,
        title: &str,
        media_type: MediaType,
        processing_status: ProcessingStatus,
        rag_status: RagStatus,
    ) -> content::Model {
        let uid = new_uid();
        let has_dataset = rag_status != RagStatus::WaitingInit;
        let now = Utc::now();

        content::ActiveModel {
            uid: Set(uid.clone()),
            user_id: Set(user_id),
            media_type: Set(media_type),
            processing_status: Set(processing_status),
            rag_status: Set(rag_status),
            source: Set(Some(format!("https://example.com/{uid}"))),
            title: Set(Some(title.to_string())),
            content: Set(Some("<p>Seeded body</p>".to_string())),
            text_content: Set(Some("Seeded body".to_string())),
            dataset_id: Set(has_dataset.then(|| format!("ds_{uid}"))),
            dataset_doc_id: Set(has_dataset.then(|| format!("doc_{uid}"))),
            attempt_generation: Set(0),
            view_count: Set(0),
            share_count: Set(0),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to seed content")
    }

    /// Seed a fully extracted and indexed article.
    pub async fn seed_completed_content(&self, user_id: i32, title: &str) -> content::Model {
        self.seed_content(
            user_id,
            title,
            MediaType::Article,
            ProcessingStatus::Completed,
            RagStatus::Completed,
        )
        .await
    }

    /// Seed a transcribed audio row that counts against the audio budget.
    pub async fn seed_audio_content(&self, user_id: i32, seconds: f64) -> content::Model {
        let uid = new_uid();
        let now = Utc::now();

        content::ActiveModel {
            uid: Set(uid.clone()),
            user_id: Set(user_id),
            media_type: Set(MediaType::Audio),
            processing_status: Set(ProcessingStatus::Completed),
            rag_status: Set(RagStatus::Completed),
            title: Set(Some("Recording".to_string())),
            media_seconds_duration: Set(Some(seconds)),
            dataset_id: Set(Some(format!("ds_{uid}"))),
            dataset_doc_id: Set(Some(format!("doc_{uid}"))),
            attempt_generation: Set(0),
            view_count: Set(0),
            share_count: Set(0),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to seed audio content")
    }

    /// Reload a content row from the database.
    pub async fn content_row(&self, uid: &str) -> content::Model {
        content::Entity::find()
            .filter(content::Column::Uid.eq(uid))
            .one(&self.db)
            .await
            .expect("DB query failed")
            .expect("Content not found")
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }

    pub fn uid(&self) -> String {
        self.body["uid"]
            .as_str()
            .expect("response body should contain 'uid'")
            .to_string()
    }
}
