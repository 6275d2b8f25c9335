use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageErrorKind {
    InvalidSymptom,
    UnknownSymptom,
    Validation,
    UnexpectedAnswer,
    CaseClosed,
    Catalog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageError {
    pub kind: TriageErrorKind,
    pub message: String,
}

impl TriageError {
    pub fn new(kind: TriageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TriageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TriageError {}

pub fn invalid_symptom(message: impl Into<String>) -> TriageError {
    TriageError::new(TriageErrorKind::InvalidSymptom, message)
}

pub fn unknown_symptom(message: impl Into<String>) -> TriageError {
    TriageError::new(TriageErrorKind::UnknownSymptom, message)
}

pub fn validation(message: impl Into<String>) -> TriageError {
    TriageError::new(TriageErrorKind::Validation, message)
}

pub fn unexpected_answer(message: impl Into<String>) -> TriageError {
    TriageError::new(TriageErrorKind::UnexpectedAnswer, message)
}

pub fn case_closed(message: impl Into<String>) -> TriageError {
    TriageError::new(TriageErrorKind::CaseClosed, message)
}

pub fn catalog_failure(message: impl Into<String>) -> TriageError {
    TriageError::new(TriageErrorKind::Catalog, message)
}
