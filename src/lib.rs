//! Periodic unread-mail summaries.

pub mod api;
pub mod config;
pub mod digest;
pub mod error;
pub mod llm;
pub mod mail;
pub mod scheduler;
pub mod store;
pub mod summarize;
