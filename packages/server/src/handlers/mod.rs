pub mod annotation;
pub mod auth;
pub mod chat;
pub mod content;
pub mod files;
pub mod knowledge_base;
