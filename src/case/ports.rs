use std::time::Duration;

use async_trait::async_trait;

use crate::{
    case::{
        error::StoreError,
        types::{CaseId, CaseRecord, CaseUpdate, UserId},
    },
    catalog::{MedicineId, SymptomId},
};

/// Persistence collaborator. Implementations serialize writes per case id.
#[async_trait]
pub trait CaseStorePort: Send + Sync {
    async fn create_case(&self, user_id: &UserId, symptom_id: SymptomId)
    -> Result<CaseId, StoreError>;

    async fn update_case(&self, case_id: CaseId, update: CaseUpdate) -> Result<(), StoreError>;

    async fn get_case(&self, case_id: CaseId) -> Result<CaseRecord, StoreError>;

    /// Applied at most once per `reference_id`.
    async fn decrement_stock(
        &self,
        medicine_id: &MedicineId,
        qty: u32,
        reference_id: &str,
    ) -> Result<(), StoreError>;
}

/// Bounds a store call so a slow backend cannot stall the flow.
pub async fn bounded<T, F>(io_timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(io_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(io_timeout)),
    }
}
