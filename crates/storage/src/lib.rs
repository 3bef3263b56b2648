//! Relational store for consultations and system prompts.
//!
//! [`Database`] connects to MySQL when configured and reachable, and falls
//! back to an embedded SQLite file otherwise. The live driver is fixed at
//! connect time and picks the placeholder style for every statement.
//!
//! Tables:
//! - `consultas`: one row per handled question, with all measurements
//! - `prompts`: operator-curated system prompts, exactly one active

pub mod consultations;
pub mod db;
pub mod persister;
pub mod prompts;
pub mod schema;

pub use db::{Database, Driver};
pub use persister::ConsultationPersister;
