use chrono::Utc;
use clients::download::{download_client, fetch_bounded};
use clients::spotify::extension_for_audio;
use common::ContentHash;
use common::storage::UPLOAD_DIR;

use super::{Extraction, IngestError, audio, audio_seconds_used};
use crate::entity::content;
use crate::state::AppState;

/// Episode downloads larger than this are rejected outright.
const MAX_DOWNLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Extract a Spotify podcast episode: metadata, audio download into object
/// storage, then the shared transcription branch on the stored file.
///
/// Both duration quotas are enforced from the episode metadata before any
/// bytes move.
pub async fn extract(
    state: &AppState,
    content: &content::Model,
) -> Result<Extraction, IngestError> {
    let source = content
        .source
        .as_deref()
        .ok_or_else(|| IngestError::Invalid("episode row has no source URL".into()))?;
    let episode_id = clients::spotify::parse_episode_id(source)
        .ok_or_else(|| IngestError::Invalid(format!("not a Spotify episode URL: {source}")))?;

    let episode = state
        .clients
        .spotify
        .episode(&episode_id)
        .await?
        .ok_or_else(|| IngestError::Invalid(format!("Spotify episode {episode_id} not found")))?;

    let single_limit = state.config.ingest.single_audio_max_seconds;
    let declared = episode.duration_seconds.unwrap_or(0.0);
    if declared > single_limit {
        return Err(IngestError::SingleAudioExceeded {
            actual: declared,
            limit: single_limit,
        });
    }

    let total_limit = state.config.ingest.total_audio_max_seconds;
    let used = audio_seconds_used(&state.db, content.user_id).await?;
    if used + declared > total_limit {
        return Err(IngestError::TotalAudioExceeded { limit: total_limit });
    }

    let audio_url = state
        .clients
        .spotify
        .episode_audio_url(&episode_id)
        .await?
        .ok_or_else(|| {
            IngestError::Invalid(format!("episode {episode_id} has no downloadable audio"))
        })?;

    let http = download_client()?;
    let download = fetch_bounded(&http, &audio_url, MAX_DOWNLOAD_BYTES).await?;
    let content_type = download.content_type.as_deref().unwrap_or_default();
    let extension = extension_for_audio(content_type).ok_or_else(|| {
        IngestError::Invalid(format!("episode audio has content type {content_type:?}"))
    })?;

    let seed = format!("{}{}{}", content.user_id, Utc::now().timestamp_millis(), episode_id);
    let storage_name = format!(
        "{UPLOAD_DIR}/{}{extension}",
        ContentHash::compute(&seed).to_hex()
    );
    state.storage.save(&storage_name, &download.bytes).await?;

    let subtitles = audio::transcribe_stored(state, &storage_name, content.lang.as_deref()).await?;
    let transcribed = subtitles
        .last()
        .map(|segment| segment.start + segment.duration);

    Ok(Extraction {
        title: episode.name,
        author: episode.podcast_name,
        site_name: Some("Spotify".to_owned()),
        published_time: episode.published_at,
        cover: episode.cover_url,
        raw_description: episode.html_description.or(episode.description),
        media_subtitles: Some(subtitles),
        media_seconds_duration: transcribed.or(episode.duration_seconds),
        file_name_in_storage: Some(storage_name),
        file_type: Some(content_type.to_owned()),
        ..Default::default()
    })
}
