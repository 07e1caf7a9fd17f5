pub mod config;
pub mod dlq;
pub mod hash;
pub mod jobs;
pub mod media;
pub mod retry;
pub mod status;
pub mod storage;
pub mod subtitles;

pub use config::{DlqConfig, MqAppConfig};
pub use dlq::{DlqEnvelope, DlqErrorCode, DlqMessageType};
pub use hash::ContentHash;
pub use jobs::{EnrichJob, EnrichmentOutput, IndexJob, IndexOutcome, JobResult};
pub use media::MediaType;
pub use status::{ProcessingStatus, RagStatus};
pub use subtitles::SubtitleSegment;
