pub mod chat;
pub mod completions;
pub mod embeddings;
pub mod error;
pub mod event_info;
pub mod images;
pub mod usage;
