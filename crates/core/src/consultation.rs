//! Consultation records: one persisted row per handled question.
//!
//! Question, answer, and measurements are written once on insert. Only the
//! usefulness flag and the free-form comment change afterwards, through
//! the feedback and comment endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::StoreError;

/// Answers shorter than this many characters are flagged as empty.
pub const EMPTY_ANSWER_THRESHOLD: usize = 150;

/// Maximum comment length, in characters, after trimming.
pub const MAX_COMMENT_CHARS: usize = 255;

/// User id recorded when the request carries none.
pub const DEFAULT_USER_ID: i64 = 321;

/// Organizational unit recorded when the request carries none.
pub const DEFAULT_UNIT: &str = "Formosa";

/// Three-valued per-consultation feedback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Usefulness {
    Unset,
    #[serde(rename = "si")]
    Yes,
    No,
}

impl Usefulness {
    /// The value stored in `respuesta_util`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Usefulness::Unset => "unset",
            Usefulness::Yes => "si",
            Usefulness::No => "no",
        }
    }

    /// Parse a stored column value. Unknown values read as unset.
    pub fn from_column(value: &str) -> Self {
        match value {
            "si" => Usefulness::Yes,
            "no" => Usefulness::No,
            _ => Usefulness::Unset,
        }
    }

    /// Map the wire feedback value (`me_gusta` / `no_me_gusta`).
    pub fn from_feedback(value: &str) -> Option<Self> {
        match value {
            "me_gusta" => Some(Usefulness::Yes),
            "no_me_gusta" => Some(Usefulness::No),
            _ => None,
        }
    }
}

/// Everything measured for one request, ready to insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConsultation {
    pub user_id: i64,
    pub unit: String,
    pub question: String,
    pub answer: String,
    pub answer_is_empty: bool,
    pub prompt_id: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub processing_time_ms: i64,
    pub error_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub model: String,
}

impl NewConsultation {
    pub fn is_empty_answer(answer: &str) -> bool {
        answer.chars().count() < EMPTY_ANSWER_THRESHOLD
    }
}

/// A stored consultation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub id: i64,
    pub timestamp: String,
    #[serde(flatten)]
    pub record: NewConsultation,
    pub usefulness: Usefulness,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Why a comment was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommentError {
    #[error("El comentario no puede estar vacío")]
    Empty,

    #[error("El comentario no puede superar los {max} caracteres (recibidos: {len})")]
    TooLong { len: usize, max: usize },
}

/// Trim a comment and check its length. Returns the text to store.
pub fn validate_comment(raw: &str) -> Result<String, CommentError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CommentError::Empty);
    }
    let len = trimmed.chars().count();
    if len > MAX_COMMENT_CHARS {
        return Err(CommentError::TooLong {
            len,
            max: MAX_COMMENT_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

/// Relational store for consultation rows.
#[async_trait]
pub trait ConsultationStore: Send + Sync {
    /// Insert a record with usefulness `unset`; returns the new id.
    async fn insert(&self, record: &NewConsultation) -> Result<i64, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Consultation>, StoreError>;

    /// Overwrite the usefulness flag. `StoreError::NotFound` if the id is unknown.
    async fn set_usefulness(&self, id: i64, value: Usefulness) -> Result<(), StoreError>;

    /// Overwrite the comment. `StoreError::NotFound` if the id is unknown.
    async fn set_comment(&self, id: i64, comment: &str) -> Result<(), StoreError>;
}
