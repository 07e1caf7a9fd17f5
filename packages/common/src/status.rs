#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a content row from creation to extraction outcome.
///
/// Allowed transitions:
/// `WaitingInit -> Pending`, `Pending -> Completed | Failed`,
/// `Failed -> Pending` (user retry). Everything else is rejected by
/// [`ProcessingStatus::can_transition`], which is the single source of truth
/// for the state machine.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in
/// SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    /// Placeholder created ahead of an upload (batch flow); no work yet.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "WAITING_INIT"))]
    WaitingInit,
    /// Extraction has been dispatched and is running (or queued to run).
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "PENDING"))]
    Pending,
    /// Extraction finished and derived fields are persisted.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "COMPLETED"))]
    Completed,
    /// Extraction failed; eligible for user retry.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "FAILED"))]
    Failed,
}

impl ProcessingStatus {
    /// Returns true if `self -> to` is an allowed transition.
    pub fn can_transition(&self, to: ProcessingStatus) -> bool {
        matches!(
            (self, to),
            (Self::WaitingInit, Self::Pending)
                | (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }

    /// Returns true while extraction work is still expected for the row.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::WaitingInit | Self::Pending)
    }

    /// All possible status values.
    pub const ALL: &'static [ProcessingStatus] = &[
        Self::WaitingInit,
        Self::Pending,
        Self::Completed,
        Self::Failed,
    ];

    /// Returns the string representation (SCREAMING_SNAKE_CASE).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingInit => "WAITING_INIT",
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl FromStr for ProcessingStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING_INIT" => Ok(Self::WaitingInit),
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(ParseStatusError {
                invalid: s.to_string(),
                valid: ProcessingStatus::ALL
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

/// Status of the retrieval-index side of a content row.
///
/// A second, loosely coupled state machine, advanced only after
/// `ProcessingStatus::Completed`. Allowed transitions:
/// `WaitingInit -> Processing` (upload to the retrieval service started,
/// dataset linkage recorded), `Processing -> Completed | PartiallyCompleted
/// | Failed`. A failure before any upload started leaves the row in
/// `WaitingInit` so that `dataset_id`/`dataset_doc_id` are always present
/// once the status has moved past `WaitingInit`. A user retry resets the row
/// back to `WaitingInit` and clears the linkage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "snake_case")]
pub enum RagStatus {
    /// Not yet handed to the retrieval service.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "waiting_init"))]
    WaitingInit,
    /// Uploaded; the remote service is parsing the document.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "processing"))]
    Processing,
    /// Parsed and chunked; ready to answer questions.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "completed"))]
    Completed,
    /// Some documents of the dataset parsed, others did not.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "partially_completed"))]
    PartiallyCompleted,
    /// The remote service failed to parse the uploaded document.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "failed"))]
    Failed,
}

impl RagStatus {
    /// Returns true if `self -> to` is an allowed transition.
    pub fn can_transition(&self, to: RagStatus) -> bool {
        matches!(
            (self, to),
            (Self::WaitingInit, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::PartiallyCompleted)
                | (Self::Processing, Self::Failed)
        )
    }

    /// Returns true once the index reached a terminal state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyCompleted | Self::Failed)
    }

    /// Returns true if the content can serve retrieval queries.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyCompleted)
    }

    /// All possible status values.
    pub const ALL: &'static [RagStatus] = &[
        Self::WaitingInit,
        Self::Processing,
        Self::Completed,
        Self::PartiallyCompleted,
        Self::Failed,
    ];

    /// Returns the string representation (snake_case).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingInit => "waiting_init",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::PartiallyCompleted => "partially_completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for RagStatus {
    fn default() -> Self {
        Self::WaitingInit
    }
}

impl FromStr for RagStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting_init" => Ok(Self::WaitingInit),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "partially_completed" => Ok(Self::PartiallyCompleted),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseStatusError {
                invalid: s.to_string(),
                valid: RagStatus::ALL
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid: String,
    valid: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}'. Valid values: {}",
            self.invalid, self.valid
        )
    }
}

impl std::error::Error for ParseStatusError {}
