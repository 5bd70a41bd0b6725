//! # salesdesk core
//!
//! Pure logic for salesdesk: data models, the local stages of the chat
//! lookup chain, spreadsheet row mapping, chat-history flattening and chat
//! analytics.
//!
//! This crate performs no I/O and has no tokio, sqlx or HTTP dependencies.
//! The application crate owns files, the database and upstream APIs and
//! calls into these functions with data already in memory.

pub mod analytics;
pub mod history;
pub mod lookup;
pub mod models;
pub mod sheet;
