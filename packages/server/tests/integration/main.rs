mod common;

mod annotation;
mod auth;
mod chat;
mod content;
mod dlq;
mod knowledge_base;
