pub mod annotation;
pub mod chat_assistant;
pub mod content;
pub mod content_kb_mapping;
pub mod dead_letter_message;
pub mod kb_subscription;
pub mod knowledge_base;
pub mod session_record;
pub mod user;

pub use chat_assistant::ChatStartType;
pub use knowledge_base::KbVisibility;
