//! # salesdesk
//!
//! Sales-enablement service for a product distributor: a catalog of active
//! and discontinued products, a chat assistant grounded on that catalog,
//! admin accounts, spreadsheet catalog uploads and a datasheet comparator.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   HTTP / CLI ──▶│  Assistant   │──▶ catalog ─▶ discontinued ─▶ knowledge API
//!                 └──────┬───────┘                                   │
//!                        │ context                                   │
//!                        ▼                                           │
//!                 ┌──────────────┐                                   │
//!                 │ ChatModel    │◀──────────────────────────────────┘
//!                 └──────┬───────┘
//!                        ▼
//!                 ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//!                 │   ChatLog    │   │ CatalogStore │   │  SQLite  │
//!                 │   (JSONL)    │   │   (JSON)     │   │ accounts │
//!                 └──────────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! Pure logic (models, lookup chain, sheet mapping, analytics) lives in the
//! `salesdesk-core` crate; this crate adds I/O, upstream clients and the
//! HTTP surface.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema and seed account |
//! | [`accounts`] | Login, registration, account management |
//! | [`catalog`] | Active and discontinued product store |
//! | [`knowledge`] | External short-answer fallback |
//! | [`llm`] | Chat-completion client |
//! | [`assistant`] | Lookup chain and response composer |
//! | [`chat_log`] | Append-only chat log |
//! | [`ingest`] | Spreadsheet uploads and backups |
//! | [`compare`] | Datasheet comparison proxy |
//! | [`analytics`] | Chat analytics report |
//! | [`server`] | HTTP API |

pub mod accounts;
pub mod analytics;
pub mod assistant;
pub mod catalog;
pub mod chat_log;
pub mod compare;
pub mod config;
pub mod db;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod migrate;
pub mod server;
