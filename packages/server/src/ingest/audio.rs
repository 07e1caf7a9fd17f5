use common::SubtitleSegment;

use super::{Extraction, IngestError};
use crate::entity::content;
use crate::state::AppState;

/// Transcribe an uploaded audio file.
///
/// The single-file duration limit can only be checked here: upload time
/// knows the byte size, not the runtime, so the quota lands after the
/// transcript reports how long the audio actually is.
pub async fn extract(
    state: &AppState,
    content: &content::Model,
) -> Result<Extraction, IngestError> {
    let storage_name = content
        .file_name_in_storage
        .as_deref()
        .ok_or_else(|| IngestError::Invalid("audio row has no stored file".into()))?;

    let subtitles = transcribe_stored(state, storage_name, content.lang.as_deref()).await?;
    let duration = subtitles
        .last()
        .map(|segment| segment.start + segment.duration)
        .unwrap_or(0.0);

    let limit = state.config.ingest.single_audio_max_seconds;
    if duration > limit {
        return Err(IngestError::SingleAudioExceeded {
            actual: duration,
            limit,
        });
    }

    Ok(Extraction {
        media_subtitles: Some(subtitles),
        media_seconds_duration: Some(duration),
        ..Default::default()
    })
}

/// Run the speech API against a stored object.
///
/// When the store serves public HTTP URLs the URL is passed straight
/// through; otherwise the bytes are inlined as a data URL with the MIME
/// type taken from the file extension.
pub(crate) async fn transcribe_stored(
    state: &AppState,
    storage_name: &str,
    lang: Option<&str>,
) -> Result<Vec<SubtitleSegment>, IngestError> {
    let url = state.storage.get_url(storage_name);
    let audio_url = if url.starts_with("http://") || url.starts_with("https://") {
        url
    } else {
        let bytes = state.storage.download(storage_name).await?;
        clients::asr::audio_data_url(storage_name, &bytes)
    };

    let lang = lang.filter(|lang| clients::asr::is_supported_language(lang));
    Ok(state.clients.asr.transcribe(&audio_url, lang).await?)
}
