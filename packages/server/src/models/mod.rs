//! Request/response types shared by the HTTP handlers.

pub mod annotation;
pub mod auth;
pub mod chat;
pub mod content;
pub mod knowledge_base;
pub mod shared;
