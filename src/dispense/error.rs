use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispenseErrorKind {
    UnknownMedicine,
    CatalogUnavailable,
    MedicineMismatch,
    MissingCase,
    CaseClosed,
    AlreadyAccepted,
    InvalidSlot,
    InvalidReference,
    NotRetryable,
    RetryExhausted,
    DeviceUnavailable,
    StoreUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenseError {
    pub kind: DispenseErrorKind,
    pub message: String,
}

impl DispenseError {
    pub fn new(kind: DispenseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for DispenseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DispenseError {}

pub fn unknown_medicine(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::UnknownMedicine, message)
}

pub fn catalog_unavailable(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::CatalogUnavailable, message)
}

pub fn medicine_mismatch(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::MedicineMismatch, message)
}

pub fn missing_case(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::MissingCase, message)
}

pub fn case_closed(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::CaseClosed, message)
}

pub fn already_accepted(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::AlreadyAccepted, message)
}

pub fn invalid_slot(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::InvalidSlot, message)
}

pub fn invalid_reference(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::InvalidReference, message)
}

pub fn not_retryable(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::NotRetryable, message)
}

pub fn retry_exhausted(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::RetryExhausted, message)
}

pub fn device_unavailable(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::DeviceUnavailable, message)
}

pub fn store_unavailable(message: impl Into<String>) -> DispenseError {
    DispenseError::new(DispenseErrorKind::StoreUnavailable, message)
}

/// Failure talking to the dispenser hardware.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("dispenser unreachable: {0}")]
    Unreachable(String),
    #[error("dispenser answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("dispenser did not answer within {0:?}")]
    Timeout(Duration),
    #[error("dispenser protocol error: {0}")]
    Protocol(String),
}
