#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of source material behind a content row.
///
/// Decides which extraction branch runs and how the derived text is built
/// for enrichment and indexing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// Web page fetched through the readability extractor.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "article"))]
    Article,
    /// YouTube video (metadata + transcript).
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "video"))]
    Video,
    /// Uploaded audio file.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "audio"))]
    Audio,
    /// Audio captured from system playback.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "audio_internal"))]
    AudioInternal,
    /// Audio captured from a microphone recording.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "audio_microphone"))]
    AudioMicrophone,
    /// Spotify podcast episode (downloaded, then transcribed).
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "spotify_audio"))]
    SpotifyAudio,
    /// Tweet or tweet thread.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "twitter"))]
    Twitter,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "pdf"))]
    Pdf,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "word"))]
    Word,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "excel"))]
    Excel,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "ppt"))]
    Ppt,
    /// Plain text or markdown file.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "text"))]
    Text,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "image"))]
    Image,
}

impl MediaType {
    /// All possible media types.
    pub const ALL: &'static [MediaType] = &[
        Self::Article,
        Self::Video,
        Self::Audio,
        Self::AudioInternal,
        Self::AudioMicrophone,
        Self::SpotifyAudio,
        Self::Twitter,
        Self::Pdf,
        Self::Word,
        Self::Excel,
        Self::Ppt,
        Self::Text,
        Self::Image,
    ];

    /// Media types counted against the audio transcription quota.
    pub const AUDIO: &'static [MediaType] = &[
        Self::Audio,
        Self::AudioInternal,
        Self::AudioMicrophone,
        Self::SpotifyAudio,
    ];

    /// Returns true for media transcribed from an audio track.
    pub fn is_audio(&self) -> bool {
        Self::AUDIO.contains(self)
    }

    /// Returns true for media whose derived text is timestamped subtitles.
    pub fn has_timeline(&self) -> bool {
        self.is_audio() || matches!(self, Self::Video)
    }

    /// Returns true for media ingested as an uploaded file.
    pub fn is_file_based(&self) -> bool {
        matches!(
            self,
            Self::Pdf | Self::Word | Self::Excel | Self::Ppt | Self::Text | Self::Image
        ) || self.is_audio() && !matches!(self, Self::SpotifyAudio)
    }

    /// Map an uploaded file's extension to a media type.
    pub fn from_extension(ext: &str) -> Option<MediaType> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" | "docx" => Some(Self::Word),
            "xls" | "xlsx" => Some(Self::Excel),
            "ppt" | "pptx" => Some(Self::Ppt),
            "txt" | "md" => Some(Self::Text),
            "mp3" | "wav" | "aac" | "ogg" | "flac" | "m4a" => Some(Self::Audio),
            "png" | "jpg" | "jpeg" | "webp" | "gif" => Some(Self::Image),
            _ => None,
        }
    }

    /// Returns the string representation (snake_case).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::AudioInternal => "audio_internal",
            Self::AudioMicrophone => "audio_microphone",
            Self::SpotifyAudio => "spotify_audio",
            Self::Twitter => "twitter",
            Self::Pdf => "pdf",
            Self::Word => "word",
            Self::Excel => "excel",
            Self::Ppt => "ppt",
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an invalid media type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMediaTypeError {
    invalid: String,
}

impl fmt::Display for ParseMediaTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid media type '{}'. Valid values: {}",
            self.invalid,
            MediaType::ALL
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseMediaTypeError {}

impl FromStr for MediaType {
    type Err = ParseMediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaType::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| ParseMediaTypeError {
                invalid: s.to_string(),
            })
    }
}
