use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogErrorKind {
    NotFound,
    InvalidCatalog,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogError {
    pub kind: CatalogErrorKind,
    pub message: String,
}

impl CatalogError {
    pub fn new(kind: CatalogErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == CatalogErrorKind::NotFound
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CatalogError {}

pub fn not_found(message: impl Into<String>) -> CatalogError {
    CatalogError::new(CatalogErrorKind::NotFound, message)
}

pub fn invalid_catalog(message: impl Into<String>) -> CatalogError {
    CatalogError::new(CatalogErrorKind::InvalidCatalog, message)
}

pub fn unavailable(message: impl Into<String>) -> CatalogError {
    CatalogError::new(CatalogErrorKind::Unavailable, message)
}
