use common::SubtitleSegment;
use common::subtitles::merge_subtitles;

use super::{Extraction, IngestError};
use crate::entity::content;
use crate::state::AppState;

/// Extract a YouTube video: Data API metadata plus the caption track,
/// merged into blocks long enough to read as paragraphs.
pub async fn extract(
    state: &AppState,
    content: &content::Model,
) -> Result<Extraction, IngestError> {
    let source = content
        .source
        .as_deref()
        .ok_or_else(|| IngestError::Invalid("video row has no source URL".into()))?;
    let video_id = clients::youtube::parse_video_id(source)
        .ok_or_else(|| IngestError::Invalid(format!("not a YouTube URL: {source}")))?;

    let video = state
        .clients
        .youtube
        .video_info(&video_id)
        .await?
        .ok_or_else(|| IngestError::Invalid(format!("YouTube video {video_id} not found")))?;

    let segments = state
        .clients
        .transcripts
        .fetch(&video_id, video.default_language.as_deref())
        .await?;
    let merged = merge_transcript(&segments, state.config.ingest.subtitle_merge_seconds);

    Ok(Extraction {
        title: video.title,
        author: video.channel_title,
        site_name: Some("YouTube".to_owned()),
        lang: video.default_language,
        published_time: video.published_at,
        cover: video.thumbnail_url,
        raw_description: video.description,
        media_seconds_duration: video.duration_seconds,
        video_embed_url: Some(video.embed_url),
        media_subtitles: Some(merged),
        ..Default::default()
    })
}

/// Caption timestamps come with sub-second noise; floor them to whole
/// seconds before merging.
fn merge_transcript(segments: &[SubtitleSegment], min_block_secs: f64) -> Vec<SubtitleSegment> {
    let floored: Vec<SubtitleSegment> = segments
        .iter()
        .map(|segment| {
            SubtitleSegment::new(
                segment.text.clone(),
                segment.start.floor(),
                segment.duration.floor(),
            )
        })
        .collect();
    merge_subtitles(&floored, min_block_secs)
}
