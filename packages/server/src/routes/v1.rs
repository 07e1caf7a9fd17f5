use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/contents", content_routes(config))
        .nest("/kbs", kb_routes())
        .nest("/annotations", annotation_routes())
        .nest("/chat", chat_routes())
        .nest("/files", file_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::register))
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::me))
}

fn content_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let uploads = OpenApiRouter::new()
        .routes(routes!(handlers::content::upload_content))
        .routes(routes!(handlers::content::upload_to_placeholder))
        .layer(handlers::content::upload_body_limit(
            config.ingest.max_upload_bytes,
        ));

    OpenApiRouter::new()
        .routes(routes!(
            handlers::content::create_content,
            handlers::content::list_contents
        ))
        .routes(routes!(handlers::content::batch_create))
        .routes(routes!(handlers::content::contents_by_uids))
        .routes(routes!(handlers::content::audio_quota))
        .routes(routes!(
            handlers::content::get_content,
            handlers::content::delete_content
        ))
        .routes(routes!(handlers::content::retry_content))
        .routes(routes!(handlers::content::count_view))
        .routes(routes!(handlers::content::count_share))
        .routes(routes!(handlers::annotation::list_content_annotations))
        .merge(uploads)
}

fn kb_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::knowledge_base::create_kb,
            handlers::knowledge_base::list_own_kbs
        ))
        .routes(routes!(handlers::knowledge_base::list_others_kbs))
        .routes(routes!(handlers::knowledge_base::list_subscriptions))
        .routes(routes!(
            handlers::knowledge_base::get_kb,
            handlers::knowledge_base::update_kb,
            handlers::knowledge_base::delete_kb
        ))
        .routes(routes!(
            handlers::knowledge_base::add_contents,
            handlers::knowledge_base::list_kb_contents
        ))
        .routes(routes!(handlers::knowledge_base::remove_content))
        .routes(routes!(handlers::knowledge_base::available_contents))
        .routes(routes!(
            handlers::knowledge_base::subscribe,
            handlers::knowledge_base::unsubscribe
        ))
}

fn annotation_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::annotation::create_annotation))
        .routes(routes!(
            handlers::annotation::update_annotation,
            handlers::annotation::delete_annotation
        ))
}

fn chat_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::chat::stream_chat))
        .routes(routes!(handlers::chat::chat_status))
}

fn file_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::files::serve_file))
}
