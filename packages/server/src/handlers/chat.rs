use std::collections::{HashMap, HashSet};
use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use clients::ChatMessage;
use clients::rag::{AnswerFrame, ChatLlmSettings, ChatUpdate, Reference, ReferenceChunk};
use common::{ProcessingStatus, RagStatus};
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use crate::entity::{
    ChatStartType, chat_assistant, content, content_kb_mapping, kb_subscription, knowledge_base,
    session_record,
};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::handlers::content::find_active_by_uid;
use crate::handlers::knowledge_base::find_visible_kb;
use crate::models::chat::{
    AvailabilityQuery, AvailabilityStatus, ChatAvailabilityResponse, ChatFrame, ChatRequest,
    EnrichedReference,
};
use crate::state::AppState;

const NOT_READY_MESSAGE: &str =
    "Content not ready yet. First-time setup in progress. Please check back shortly.";
const SETUP_FAILED_MESSAGE: &str = "Unable to create conversation. Please try again later.";
const STREAM_START_FAILED_MESSAGE: &str =
    "We're experiencing technical difficulties processing your question. Please try again later.";
const CHUNK_FAILED_MESSAGE: &str =
    "We encountered an issue while generating your answer. Please try asking again or come back later.";
const REQUEST_FAILED_MESSAGE: &str = "Sorry, we couldn't process your request. Your documents \
    may still be processing or there might be a network issue. Please try again later.";
const ANALYZING_MESSAGE: &str =
    "Some content still analyzing. Current answers are limited to ready data.";

const FOLLOWUP_SYSTEM_PROMPT: &str = "You suggest follow-up questions for a document chat. \
Respond with a JSON object containing exactly one key, \"followup_question\": an array of at \
most three short questions the user could ask next. Write them in the language of the \
conversation. Return an empty array when nothing meaningful can be asked.";

const MAX_FOLLOWUPS: usize = 3;

/// Stream a retrieval-augmented answer.
#[utoipa::path(
    post,
    path = "/stream",
    tag = "Chat",
    operation_id = "streamChat",
    summary = "Stream a retrieval-augmented answer",
    description = "Answers over the datasets behind the requested chat surface. The response \
        is `application/x-ndjson`: `processing` frames while the answer grows, one \
        `followup_preparing` frame once it is complete, then a terminal `completed` frame \
        carrying references and follow-up questions. Failures surface as a terminal `error` \
        frame inside the stream.",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "NDJSON stream of chat frames", content_type = "application/x-ndjson", body = ChatFrame),
        (status = 400, description = "Invalid input (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn stream_chat(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<ChatRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let (tx, rx) = mpsc::channel::<ChatFrame>(16);
    tokio::spawn(run_chat(state, auth_user, payload, tx));

    let body = Body::from_stream(rx.map(|frame| Ok::<_, Infallible>(frame.to_ndjson_line())));
    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Report whether a chat surface is ready.
#[utoipa::path(
    get,
    path = "/status",
    tag = "Chat",
    operation_id = "chatStatus",
    summary = "Report whether a chat surface is ready",
    description = "`available` when every eligible content behind the surface is indexed, \
        `partially_available` while some are still being indexed, `unavailable` when none are.",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Readiness of the chat surface", body = ChatAvailabilityResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn chat_status(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<ChatAvailabilityResponse>, AppError> {
    let resolved = match resolve_datasets(
        &state,
        &auth_user,
        query.chat_start_type,
        query.content_uid.as_deref(),
        query.kb_uid.as_deref(),
    )
    .await
    {
        Ok(resolved) => resolved,
        Err(ResolveError::NotReady(_)) => {
            return Ok(Json(ChatAvailabilityResponse {
                status: AvailabilityStatus::Unavailable,
                message: ANALYZING_MESSAGE.to_owned(),
            }));
        }
        Err(ResolveError::Db(e)) => return Err(AppError::from(e)),
    };

    let ready = resolved.dataset_ids.len();
    let response = if ready == 0 {
        ChatAvailabilityResponse {
            status: AvailabilityStatus::Unavailable,
            message: ANALYZING_MESSAGE.to_owned(),
        }
    } else if ready < resolved.total_when_ready {
        ChatAvailabilityResponse {
            status: AvailabilityStatus::PartiallyAvailable,
            message: ANALYZING_MESSAGE.to_owned(),
        }
    } else {
        ChatAvailabilityResponse {
            status: AvailabilityStatus::Available,
            message: String::new(),
        }
    };
    Ok(Json(response))
}

/// Everything the stream task needs about the requested surface.
struct ResolvedDatasets {
    /// Datasets of fully indexed contents.
    dataset_ids: Vec<String>,
    assistant_name: String,
    content: Option<content::Model>,
    kb: Option<knowledge_base::Model>,
    /// How many datasets there would be once indexing catches up.
    total_when_ready: usize,
}

enum ResolveError {
    /// User-facing; streamed to the client verbatim.
    NotReady(String),
    Db(DbErr),
}

impl From<DbErr> for ResolveError {
    fn from(e: DbErr) -> Self {
        Self::Db(e)
    }
}

async fn resolve_datasets(
    state: &AppState,
    auth_user: &AuthUser,
    chat_start_type: ChatStartType,
    content_uid: Option<&str>,
    kb_uid: Option<&str>,
) -> Result<ResolvedDatasets, ResolveError> {
    match chat_start_type {
        ChatStartType::Inbox => {
            let contents = content::Entity::find()
                .filter(content::Column::UserId.eq(auth_user.user_id))
                .filter(content::Column::IsDeleted.eq(false))
                .filter(content::Column::ProcessingStatus.eq(ProcessingStatus::Completed))
                .filter(
                    content::Column::RagStatus
                        .is_in([RagStatus::Completed, RagStatus::Processing]),
                )
                .order_by_desc(content::Column::CreatedAt)
                .all(&state.db)
                .await?;
            Ok(ResolvedDatasets {
                dataset_ids: ready_dataset_ids(&contents),
                assistant_name: format!("{} - {}", ChatStartType::Inbox, auth_user.username),
                total_when_ready: contents.len(),
                content: None,
                kb: None,
            })
        }
        ChatStartType::MyKnowledgeBases => {
            let kb_ids = reachable_kb_ids(&state.db, auth_user.user_id).await?;
            let contents = linked_contents(&state.db, kb_ids).await?;
            Ok(ResolvedDatasets {
                dataset_ids: ready_dataset_ids(&contents),
                assistant_name: format!(
                    "{} - {}",
                    ChatStartType::MyKnowledgeBases,
                    auth_user.username
                ),
                total_when_ready: contents.len(),
                content: None,
                kb: None,
            })
        }
        ChatStartType::Article => {
            let uid = content_uid.ok_or_else(|| {
                ResolveError::NotReady("Content UID is required for article chat".into())
            })?;
            let content = find_active_by_uid(&state.db, uid)
                .await?
                .ok_or_else(|| ResolveError::NotReady("Content not found".into()))?;
            if content.rag_status != RagStatus::Completed {
                return Err(ResolveError::NotReady("Content is not ready for chat".into()));
            }
            Ok(ResolvedDatasets {
                dataset_ids: content.dataset_id.clone().into_iter().collect(),
                assistant_name: format!(
                    "{} - {} - {}",
                    ChatStartType::Article,
                    auth_user.username,
                    content.uid
                ),
                total_when_ready: 1,
                content: Some(content),
                kb: None,
            })
        }
        ChatStartType::SingleKnowledgeBase => {
            let uid = kb_uid.ok_or_else(|| {
                ResolveError::NotReady("Knowledge Base ID is required".into())
            })?;
            let kb = find_visible_kb(&state.db, uid, auth_user.user_id)
                .await?
                .ok_or_else(|| ResolveError::NotReady("Knowledge Base not found".into()))?;

            let content_ids: Vec<i32> = content_kb_mapping::Entity::find()
                .select_only()
                .column(content_kb_mapping::Column::ContentId)
                .filter(content_kb_mapping::Column::KnowledgeBaseId.eq(kb.id))
                .filter(content_kb_mapping::Column::IsDeleted.eq(false))
                .into_tuple()
                .all(&state.db)
                .await?;
            let contents = if content_ids.is_empty() {
                Vec::new()
            } else {
                content::Entity::find()
                    .filter(content::Column::Id.is_in(content_ids))
                    .filter(content::Column::IsDeleted.eq(false))
                    .filter(content::Column::ProcessingStatus.eq(ProcessingStatus::Completed))
                    .filter(
                        content::Column::RagStatus
                            .is_in([RagStatus::Completed, RagStatus::Processing]),
                    )
                    .all(&state.db)
                    .await?
            };
            Ok(ResolvedDatasets {
                dataset_ids: ready_dataset_ids(&contents),
                assistant_name: format!(
                    "{} - {} - {}",
                    ChatStartType::SingleKnowledgeBase,
                    auth_user.username,
                    kb.uid
                ),
                total_when_ready: contents.len(),
                content: None,
                kb: Some(kb),
            })
        }
    }
}

/// Dataset ids of the rows whose indexing already finished.
fn ready_dataset_ids(contents: &[content::Model]) -> Vec<String> {
    contents
        .iter()
        .filter(|c| c.rag_status == RagStatus::Completed)
        .filter_map(|c| c.dataset_id.clone())
        .collect()
}

/// Ids of every base the user owns or subscribes to.
async fn reachable_kb_ids(db: &DatabaseConnection, user_id: i32) -> Result<Vec<i32>, DbErr> {
    let owned: Vec<i32> = knowledge_base::Entity::find()
        .select_only()
        .column(knowledge_base::Column::Id)
        .filter(knowledge_base::Column::UserId.eq(user_id))
        .filter(knowledge_base::Column::IsDeleted.eq(false))
        .into_tuple()
        .all(db)
        .await?;
    let subscribed: Vec<i32> = kb_subscription::Entity::find()
        .select_only()
        .column(kb_subscription::Column::KnowledgeBaseId)
        .join(JoinType::InnerJoin, kb_subscription::Relation::KnowledgeBase.def())
        .filter(kb_subscription::Column::UserId.eq(user_id))
        .filter(kb_subscription::Column::IsDeleted.eq(false))
        .filter(knowledge_base::Column::IsDeleted.eq(false))
        .into_tuple()
        .all(db)
        .await?;

    let ids: HashSet<i32> = owned.into_iter().chain(subscribed).collect();
    Ok(ids.into_iter().collect())
}

/// Contents linked into any of the given bases that carry dataset linkage.
async fn linked_contents(
    db: &DatabaseConnection,
    kb_ids: Vec<i32>,
) -> Result<Vec<content::Model>, DbErr> {
    if kb_ids.is_empty() {
        return Ok(Vec::new());
    }
    let content_ids: Vec<i32> = content_kb_mapping::Entity::find()
        .select_only()
        .column(content_kb_mapping::Column::ContentId)
        .distinct()
        .filter(content_kb_mapping::Column::KnowledgeBaseId.is_in(kb_ids))
        .filter(content_kb_mapping::Column::IsDeleted.eq(false))
        .into_tuple()
        .all(db)
        .await?;
    if content_ids.is_empty() {
        return Ok(Vec::new());
    }
    content::Entity::find()
        .filter(content::Column::Id.is_in(content_ids))
        .filter(content::Column::IsDeleted.eq(false))
        .filter(content::Column::DatasetId.is_not_null())
        .filter(content::Column::DatasetDocId.is_not_null())
        .all(db)
        .await
}

struct ChatTarget {
    chat_id: String,
    session_id: String,
}

/// Low-temperature sampling keeps answers anchored to the retrieved chunks.
fn assistant_llm_settings() -> ChatLlmSettings {
    ChatLlmSettings {
        frequency_penalty: 0.7,
        presence_penalty: 0.4,
        temperature: 0.1,
        top_p: 0.3,
    }
}

fn session_name() -> String {
    format!("session - {}", Utc::now().format("%Y-%m-%d %H:%M:%S"))
}

/// Find or create the remote assistant, point it at the resolved datasets
/// and return the session to converse in.
async fn prepare_chat(
    state: &AppState,
    auth_user: &AuthUser,
    request: &ChatRequest,
    resolved: &ResolvedDatasets,
) -> anyhow::Result<ChatTarget> {
    let rag = &state.clients.rag;
    let name = &resolved.assistant_name;

    let chat = match rag.find_chat(name).await? {
        Some(chat) => chat,
        None => rag.create_chat(name, &resolved.dataset_ids).await?,
    };
    rag.update_chat(
        &chat.id,
        &ChatUpdate {
            name: Some(name.clone()),
            dataset_ids: Some(resolved.dataset_ids.clone()),
            llm: Some(assistant_llm_settings()),
        },
    )
    .await?;

    sync_assistant_row(state, auth_user, request.chat_start_type, resolved, &chat.id).await?;
    let session_id = sync_session_row(state, auth_user, request, resolved, &chat.id).await?;
    Ok(ChatTarget {
        chat_id: chat.id,
        session_id,
    })
}

async fn sync_assistant_row(
    state: &AppState,
    auth_user: &AuthUser,
    chat_start_type: ChatStartType,
    resolved: &ResolvedDatasets,
    agent_id: &str,
) -> Result<(), DbErr> {
    let existing = chat_assistant::Entity::find()
        .filter(chat_assistant::Column::Name.eq(&resolved.assistant_name))
        .filter(chat_assistant::Column::IsDeleted.eq(false))
        .one(&state.db)
        .await?;

    match existing {
        Some(row) if row.agent_id.as_deref() == Some(agent_id) => {}
        Some(row) => {
            chat_assistant::ActiveModel {
                id: Set(row.id),
                agent_id: Set(Some(agent_id.to_owned())),
                updated_at: Set(Utc::now()),
                ..Default::default()
            }
            .update(&state.db)
            .await?;
        }
        None => {
            let now = Utc::now();
            chat_assistant::ActiveModel {
                name: Set(resolved.assistant_name.clone()),
                user_id: Set(auth_user.user_id),
                chat_start_type: Set(chat_start_type),
                kb_id: Set(resolved.kb.as_ref().map(|kb| kb.id)),
                content_id: Set(resolved.content.as_ref().map(|c| c.id)),
                agent_id: Set(Some(agent_id.to_owned())),
                description: Set(Some(format!("Assistant for {chat_start_type}"))),
                is_deleted: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&state.db)
            .await?;
        }
    }
    Ok(())
}

/// Reuse the recorded session while it still belongs to the assistant;
/// open a fresh remote session when the assistant changed.
async fn sync_session_row(
    state: &AppState,
    auth_user: &AuthUser,
    request: &ChatRequest,
    resolved: &ResolvedDatasets,
    agent_id: &str,
) -> anyhow::Result<String> {
    let mut query = session_record::Entity::find()
        .filter(session_record::Column::UserId.eq(auth_user.user_id))
        .filter(session_record::Column::ChatStartType.eq(request.chat_start_type))
        .filter(session_record::Column::IsDeleted.eq(false));
    if let Some(content) = &resolved.content {
        query = query.filter(session_record::Column::ContentId.eq(content.id));
    }
    if let Some(kb) = &resolved.kb {
        query = query.filter(session_record::Column::KbId.eq(kb.id));
    }
    let existing = query.one(&state.db).await?;

    match existing {
        Some(row) if row.agent_id.as_deref() == Some(agent_id) => {
            if row.use_web_search != request.use_web_search {
                session_record::ActiveModel {
                    id: Set(row.id),
                    use_web_search: Set(request.use_web_search),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                }
                .update(&state.db)
                .await?;
            }
            Ok(row.session_id)
        }
        Some(row) => {
            let session = state.clients.rag.create_session(agent_id, &session_name()).await?;
            session_record::ActiveModel {
                id: Set(row.id),
                session_id: Set(session.id.clone()),
                agent_id: Set(Some(agent_id.to_owned())),
                use_web_search: Set(request.use_web_search),
                updated_at: Set(Utc::now()),
                ..Default::default()
            }
            .update(&state.db)
            .await?;
            Ok(session.id)
        }
        None => {
            let session = state.clients.rag.create_session(agent_id, &session_name()).await?;
            let now = Utc::now();
            session_record::ActiveModel {
                user_id: Set(auth_user.user_id),
                chat_start_type: Set(request.chat_start_type),
                content_id: Set(resolved.content.as_ref().map(|c| c.id)),
                kb_id: Set(resolved.kb.as_ref().map(|kb| kb.id)),
                session_id: Set(session.id.clone()),
                agent_id: Set(Some(agent_id.to_owned())),
                use_web_search: Set(request.use_web_search),
                is_deleted: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&state.db)
            .await?;
            Ok(session.id)
        }
    }
}

/// Drives one answer stream end to end, sending frames into the channel.
///
/// Every failure past this point surfaces as a terminal error frame; when
/// the client hangs up the sends fail and the task simply stops.
async fn run_chat(
    state: AppState,
    auth_user: AuthUser,
    request: ChatRequest,
    mut tx: mpsc::Sender<ChatFrame>,
) {
    let msg_id = request.msg_id.clone();

    let resolved = match resolve_datasets(
        &state,
        &auth_user,
        request.chat_start_type,
        request.content_uid.as_deref(),
        request.kb_uid.as_deref(),
    )
    .await
    {
        Ok(resolved) => resolved,
        Err(ResolveError::NotReady(message)) => {
            let _ = tx.send(ChatFrame::error(&msg_id, message)).await;
            return;
        }
        Err(ResolveError::Db(e)) => {
            error!(error = %e, "chat dataset resolution failed");
            let _ = tx.send(ChatFrame::error(&msg_id, REQUEST_FAILED_MESSAGE)).await;
            return;
        }
    };

    if resolved.dataset_ids.is_empty() {
        let _ = tx.send(ChatFrame::error(&msg_id, NOT_READY_MESSAGE)).await;
        return;
    }

    let target = match prepare_chat(&state, &auth_user, &request, &resolved).await {
        Ok(target) => target,
        Err(e) => {
            error!("chat session setup failed: {e:#}");
            let _ = tx.send(ChatFrame::error(&msg_id, SETUP_FAILED_MESSAGE)).await;
            return;
        }
    };

    info!(
        assistant = %resolved.assistant_name,
        datasets = resolved.dataset_ids.len(),
        "chat stream started"
    );

    let mut answers = match state
        .clients
        .rag
        .ask(&target.chat_id, &target.session_id, &request.question)
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "answer stream failed to start");
            let _ = tx.send(ChatFrame::error(&msg_id, STREAM_START_FAILED_MESSAGE)).await;
            return;
        }
    };

    // Relay one frame behind, so the closing frame can be held back and
    // upgraded into the followup_preparing/completed pair.
    let mut last: Option<AnswerFrame> = None;
    while let Some(next) = answers.next().await {
        match next {
            Ok(frame) => {
                if let Some(previous) = last.replace(frame) {
                    let frame = ChatFrame::processing(&msg_id, previous.answer);
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "answer stream broke mid-way");
                let _ = tx.send(ChatFrame::error(&msg_id, CHUNK_FAILED_MESSAGE)).await;
                return;
            }
        }
    }

    // A stream that never produced an answer ends without terminal frames.
    let Some(last) = last else { return };

    let preparing = ChatFrame::followup_preparing(&msg_id, last.answer.clone());
    if tx.send(preparing).await.is_err() {
        return;
    }

    let reference = enrich_references(&state, last.reference.as_ref()).await;
    let followups =
        generate_followups(&state, &request.question, &last.answer, last.reference.as_ref()).await;
    let _ = tx
        .send(ChatFrame::completed(&msg_id, last.answer, reference, followups))
        .await;
}

/// Join remote chunks back to local contents. Enrichment failures degrade
/// to an empty list instead of killing the stream.
async fn enrich_references(
    state: &AppState,
    reference: Option<&Reference>,
) -> Option<Vec<EnrichedReference>> {
    let reference = reference?;
    if reference.chunks.is_empty() {
        return None;
    }
    match enrich_reference_chunks(state, &reference.chunks).await {
        Ok(enriched) => Some(enriched),
        Err(e) => {
            warn!(error = %e, "reference enrichment failed");
            Some(Vec::new())
        }
    }
}

async fn enrich_reference_chunks(
    state: &AppState,
    chunks: &[ReferenceChunk],
) -> Result<Vec<EnrichedReference>, DbErr> {
    let pairs: Vec<(&str, &str)> = chunks
        .iter()
        .filter_map(|chunk| chunk_pair(chunk))
        .collect();

    let mut by_pair: HashMap<(String, String), content::Model> = HashMap::new();
    if !pairs.is_empty() {
        let mut condition = Condition::any();
        for (dataset, document) in &pairs {
            condition = condition.add(
                Condition::all()
                    .add(content::Column::DatasetId.eq(*dataset))
                    .add(content::Column::DatasetDocId.eq(*document)),
            );
        }
        let contents = content::Entity::find()
            .filter(condition)
            .filter(content::Column::IsDeleted.eq(false))
            .all(&state.db)
            .await?;
        for model in contents {
            if let (Some(dataset), Some(document)) =
                (model.dataset_id.clone(), model.dataset_doc_id.clone())
            {
                by_pair.insert((dataset, document), model);
            }
        }
    }

    let page_base = &state.config.server.content_page_url;
    let mut enriched = Vec::new();
    for chunk in chunks {
        match chunk_pair(chunk) {
            Some((dataset, document)) => {
                if let Some(model) = by_pair.get(&(dataset.to_owned(), document.to_owned())) {
                    enriched.push(EnrichedReference::internal(chunk, model, page_base));
                }
            }
            None if chunk.document_id.is_some() => {
                enriched.push(EnrichedReference::external(chunk));
            }
            None => {}
        }
    }
    Ok(enriched)
}

/// The lookup key of an internal chunk; None for web-search results,
/// which carry a document but no dataset.
fn chunk_pair(chunk: &ReferenceChunk) -> Option<(&str, &str)> {
    match (chunk.dataset_id.as_deref(), chunk.document_id.as_deref()) {
        (Some(dataset), Some(document)) if !dataset.trim().is_empty() => Some((dataset, document)),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct FollowupOutput {
    #[serde(default)]
    followup_question: Vec<String>,
}

async fn generate_followups(
    state: &AppState,
    question: &str,
    answer: &str,
    reference: Option<&Reference>,
) -> Vec<String> {
    let excerpt = reference.map(reference_excerpt).unwrap_or_default();
    let user_prompt =
        format!("Question:\n{question}\n\nAnswer:\n{answer}\n\nSource excerpts:\n{excerpt}");
    let messages = [
        ChatMessage::system(FOLLOWUP_SYSTEM_PROMPT),
        ChatMessage::user(user_prompt),
    ];

    let raw = match state.clients.llm.complete_json(&messages).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "followup generation failed");
            return Vec::new();
        }
    };
    match serde_json::from_str::<FollowupOutput>(&raw) {
        Ok(output) => {
            let mut questions = output.followup_question;
            questions.truncate(MAX_FOLLOWUPS);
            questions
        }
        Err(e) => {
            warn!(error = %e, "followup output was not valid JSON");
            Vec::new()
        }
    }
}

/// Chunk texts from the first five references, newline-joined, as
/// grounding for the followup prompt.
fn reference_excerpt(reference: &Reference) -> String {
    let lines: Vec<&str> = reference
        .chunks
        .iter()
        .take(5)
        .filter_map(|chunk| chunk.content.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect();
    lines.join("\n")
}
