//! HTTP clients for every upstream service the platform talks to:
//! article extraction, YouTube metadata and transcripts, podcast and tweet
//! lookup, speech-to-text, chat completions and the RAG engine.

pub mod asr;
pub mod download;
pub mod error;
pub mod llm;
pub mod rag;
pub mod readability;
pub mod retry;
pub mod spotify;
pub mod transcripts;
pub mod twitter;
pub mod youtube;

pub use asr::AsrClient;
pub use download::{Download, fetch_bounded};
pub use error::ClientError;
pub use llm::{ChatMessage, LlmClient};
pub use rag::RagClient;
pub use readability::{ExtractedArticle, ReadabilityClient};
pub use retry::{RetryPolicy, with_retries};
pub use spotify::SpotifyClient;
pub use transcripts::TranscriptClient;
pub use twitter::TwitterClient;
pub use youtube::YouTubeClient;
