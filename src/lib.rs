//! # SQL Query Guard Library
//!
//! Safety gate and repair layer for SQL produced by language-model agents.
//!
//! ```text
//! query ─► preprocessor ─► SecurityValidator ─► QueryExecutor
//!                              │                     │ error
//!                          blocked                   ▼
//!                              │            ErrorClassifier ─► CorrectionService
//!                              ▼                     │
//!                        SecurityReport              └──► retry (bounded)
//!
//! question + tables ─► SemanticTableSelector ─► relevant tables
//! ```
//!
//! # Modules
//!
//! - [`injection`] - Categorized injection pattern detection and scoring
//! - [`validator`] - Policy validation producing a [`validator::SecurityReport`]
//! - [`recovery`] - Database error classification and targeted repair
//! - [`correction`] - Strategy-tiered query correction and suggestions
//! - [`executor`] - Validate, execute and repair in one bounded loop
//! - [`selector`] - Embedding-based relevant table selection
//! - [`monitor`] - Security event ring buffer, alerts and reports
//! - [`stats`] - Injectable pipeline telemetry
//! - [`schema`] - Schema lookup and table descriptors
//! - [`config`] - Configuration loading
//! - [`output`] - Result formatting
//! - [`error`] - Error types and constructors

pub mod app;
pub mod cli;
pub mod config;
pub mod correction;
pub mod error;
pub mod executor;
pub mod injection;
pub mod monitor;
pub mod output;
pub mod preprocessor;
pub mod recovery;
pub mod schema;
pub mod selector;
pub mod stats;
pub mod validator;

pub use masterror::{AppError, AppResult};
