use serde::{Deserialize, Serialize};

/// One timed block of transcript text.
///
/// `start` and `duration` are in seconds. Stored as a JSON array on the
/// content row and rendered into timestamped text for enrichment and
/// indexing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SubtitleSegment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

impl SubtitleSegment {
    pub fn new(text: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            text: text.into(),
            start,
            duration,
        }
    }
}

/// Merge fine-grained transcript segments into blocks of at least
/// `min_block_secs` seconds.
///
/// Segments are accumulated in order, joining text with a single space and
/// summing durations, and a block is emitted as soon as it reaches the
/// threshold. A trailing block shorter than the threshold is kept as-is.
/// Negative input durations are clamped to zero, so the output never
/// contains a negative duration. Running the merge again on its own output
/// returns it unchanged.
pub fn merge_subtitles(segments: &[SubtitleSegment], min_block_secs: f64) -> Vec<SubtitleSegment> {
    let mut merged = Vec::new();
    let mut current: Option<SubtitleSegment> = None;

    for segment in segments {
        let duration = segment.duration.max(0.0);
        match current.as_mut() {
            None => {
                current = Some(SubtitleSegment::new(
                    segment.text.clone(),
                    segment.start,
                    duration,
                ));
            }
            Some(block) => {
                if !segment.text.is_empty() {
                    if !block.text.is_empty() {
                        block.text.push(' ');
                    }
                    block.text.push_str(&segment.text);
                }
                block.duration += duration;
            }
        }

        if current.as_ref().is_some_and(|b| b.duration >= min_block_secs) {
            if let Some(block) = current.take() {
                merged.push(block);
            }
        }
    }

    if let Some(block) = current {
        merged.push(block);
    }

    merged
}

/// Format seconds as `MM:SS`. Minutes are not wrapped at an hour.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Render segments as `MM:SS - MM:SS, text` lines for language-model input.
pub fn format_subtitles(segments: &[SubtitleSegment]) -> String {
    segments
        .iter()
        .map(|s| {
            format!(
                "{} - {}, {}",
                format_timestamp(s.start),
                format_timestamp(s.start + s.duration),
                s.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render segments as `MM:SS-MM:SS text` lines for index upload.
pub fn format_subtitles_compact(segments: &[SubtitleSegment]) -> String {
    segments
        .iter()
        .map(|s| {
            format!(
                "{}-{} {}",
                format_timestamp(s.start),
                format_timestamp(s.start + s.duration),
                s.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
