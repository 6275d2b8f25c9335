use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::Mutex;

use crate::{
    case::{
        error::StoreError,
        persistence::CaseStorePersistence,
        ports::CaseStorePort,
        types::{CaseId, CaseRecord, CaseUpdate, DispenseStatus, UserId},
    },
    catalog::{MedicineId, SymptomId},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStoreSnapshot {
    pub next_case_id: u64,
    #[serde(default)]
    pub cases: BTreeMap<CaseId, CaseRecord>,
    #[serde(default)]
    pub stock: BTreeMap<MedicineId, u32>,
    #[serde(default)]
    pub applied_stock_refs: BTreeSet<String>,
}

/// Case store kept in memory, optionally mirrored to a JSON snapshot file
/// after every write. A single lock serializes all writes.
pub struct MemoryCaseStore {
    state: Mutex<CaseStoreSnapshot>,
    persistence: Option<CaseStorePersistence>,
}

impl Default for MemoryCaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCaseStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CaseStoreSnapshot::default()),
            persistence: None,
        }
    }

    pub fn with_stock(stock: BTreeMap<MedicineId, u32>) -> Self {
        Self {
            state: Mutex::new(CaseStoreSnapshot {
                stock,
                ..CaseStoreSnapshot::default()
            }),
            persistence: None,
        }
    }

    /// Restores the last snapshot, or starts from `initial_stock` when no
    /// snapshot exists yet.
    pub fn open(
        persistence: CaseStorePersistence,
        initial_stock: BTreeMap<MedicineId, u32>,
    ) -> Result<Self, StoreError> {
        let snapshot = match persistence.load()? {
            Some(snapshot) => snapshot,
            None => CaseStoreSnapshot {
                stock: initial_stock,
                ..CaseStoreSnapshot::default()
            },
        };
        Ok(Self {
            state: Mutex::new(snapshot),
            persistence: Some(persistence),
        })
    }

    pub async fn snapshot(&self) -> CaseStoreSnapshot {
        self.state.lock().await.clone()
    }

    pub async fn stock_level(&self, medicine_id: &MedicineId) -> Option<u32> {
        self.state.lock().await.stock.get(medicine_id).copied()
    }

    fn commit(&self, state: &CaseStoreSnapshot) -> Result<(), StoreError> {
        match &self.persistence {
            Some(persistence) => persistence.save(state),
            None => Ok(()),
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

fn check_update_allowed(record: &CaseRecord, update: &CaseUpdate) -> Result<(), StoreError> {
    if record.is_terminal() {
        if update.is_noop_for(record) {
            return Ok(());
        }
        return Err(StoreError::CaseClosed {
            case_id: record.case_id,
            status: record.dispense_status,
        });
    }
    if record.dispense_status != DispenseStatus::Pending && update.touches_triage_fields() {
        return Err(StoreError::TriageFrozen {
            case_id: record.case_id,
        });
    }
    Ok(())
}

#[async_trait]
impl CaseStorePort for MemoryCaseStore {
    async fn create_case(
        &self,
        user_id: &UserId,
        symptom_id: SymptomId,
    ) -> Result<CaseId, StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.next_case_id = next.next_case_id.saturating_add(1);
        let case_id = CaseId(next.next_case_id);
        next.cases.insert(
            case_id,
            CaseRecord::new(case_id, user_id.clone(), symptom_id, now_rfc3339()),
        );
        self.commit(&next)?;
        *state = next;

        tracing::debug!(
            target: "case_store",
            case_id = %case_id,
            user_id = %user_id,
            symptom_id = %symptom_id,
            "case_created"
        );
        Ok(case_id)
    }

    async fn update_case(&self, case_id: CaseId, update: CaseUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        let record = state
            .cases
            .get(&case_id)
            .ok_or(StoreError::CaseNotFound(case_id))?;
        check_update_allowed(record, &update)?;
        if update.is_noop_for(record) {
            return Ok(());
        }

        let mut next = state.clone();
        if let Some(record) = next.cases.get_mut(&case_id) {
            update.apply(record);
        }
        self.commit(&next)?;
        *state = next;

        tracing::debug!(
            target: "case_store",
            case_id = %case_id,
            update = ?update,
            "case_updated"
        );
        Ok(())
    }

    async fn get_case(&self, case_id: CaseId) -> Result<CaseRecord, StoreError> {
        self.state
            .lock()
            .await
            .cases
            .get(&case_id)
            .cloned()
            .ok_or(StoreError::CaseNotFound(case_id))
    }

    async fn decrement_stock(
        &self,
        medicine_id: &MedicineId,
        qty: u32,
        reference_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.applied_stock_refs.contains(reference_id) {
            tracing::debug!(
                target: "case_store",
                medicine_id = %medicine_id,
                reference_id = %reference_id,
                "stock_decrement_deduplicated"
            );
            return Ok(());
        }

        let available = *state
            .stock
            .get(medicine_id)
            .ok_or_else(|| StoreError::UntrackedStock(medicine_id.clone()))?;
        if available < qty {
            return Err(StoreError::InsufficientStock {
                medicine_id: medicine_id.clone(),
                requested: qty,
                available,
            });
        }

        let mut next = state.clone();
        next.stock.insert(medicine_id.clone(), available - qty);
        next.applied_stock_refs.insert(reference_id.to_string());
        self.commit(&next)?;
        *state = next;

        tracing::info!(
            target: "case_store",
            medicine_id = %medicine_id,
            qty = qty,
            remaining = available - qty,
            reference_id = %reference_id,
            "stock_decremented"
        );
        Ok(())
    }
}
