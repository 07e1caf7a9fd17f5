use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clients::ChatMessage;
use common::hash::ContentHash;
use serde::Deserialize;

use super::{Extraction, IngestError};
use crate::entity::content;
use crate::state::AppState;

const SYSTEM_PROMPT: &str = "You analyze images for a read-later service. Respond \
with a JSON object containing exactly these keys: \"title\" (a descriptive title \
for the image), \"content\" (a detailed analysis and interpretation of the image), \
\"ocr_result\" (all text transcribed from the image, or an empty string if there \
is none).";

const USER_PROMPT: &str = "Examine the image carefully. Identify any text present \
and transcribe it accurately as the OCR result. Then interpret the meaning of the \
text within the context of the image's visual elements. Generate a descriptive \
title that captures the image's essence, and provide an analysis integrating the \
textual and visual information to explain the image's content, purpose, and \
potential message. Respond using the language detected in the image.";

#[derive(Debug, Deserialize)]
struct VisionOutput {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    ocr_result: String,
}

/// Caption an uploaded image with the vision model.
///
/// The analysis doubles as the row's content and text, so image posts are
/// searchable and indexable like any article.
pub async fn extract(
    state: &AppState,
    content: &content::Model,
) -> Result<Extraction, IngestError> {
    let storage_name = content
        .file_name_in_storage
        .as_deref()
        .ok_or_else(|| IngestError::Invalid("image row has no stored object".into()))?;

    let bytes = state.storage.download(storage_name).await?;
    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user_with_image(USER_PROMPT, data_url(storage_name, &bytes)),
    ];
    let raw = state.clients.llm.complete_json(&messages).await?;
    let caption: VisionOutput = serde_json::from_str(&raw)
        .map_err(|e| IngestError::Invalid(format!("vision output was not valid JSON: {e}")))?;

    let analysis = caption.content.trim();
    if analysis.is_empty() {
        return Err(IngestError::Invalid("vision model returned no analysis".into()));
    }

    Ok(Extraction {
        title: non_empty(&caption.title),
        content: Some(analysis.to_owned()),
        text_content: Some(analysis.to_owned()),
        image_ocr: non_empty(&caption.ocr_result),
        content_hash: Some(ContentHash::compute(analysis).to_hex()),
        cover: Some(state.storage.get_url(storage_name)),
        ..Default::default()
    })
}

fn data_url(storage_name: &str, bytes: &[u8]) -> String {
    let mime = mime_guess::from_path(storage_name).first_or_octet_stream();
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
