use std::time::Duration;

use thiserror::Error;

use crate::{
    case::types::{CaseId, DispenseStatus},
    catalog::MedicineId,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("case {0} does not exist")]
    CaseNotFound(CaseId),
    #[error("case {case_id} is closed (dispense_status={status})")]
    CaseClosed {
        case_id: CaseId,
        status: DispenseStatus,
    },
    #[error("triage fields of case {case_id} are frozen once dispensing started")]
    TriageFrozen { case_id: CaseId },
    #[error("stock for medicine '{0}' is not tracked")]
    UntrackedStock(MedicineId),
    #[error("insufficient stock for medicine '{medicine_id}': requested {requested}, available {available}")]
    InsufficientStock {
        medicine_id: MedicineId,
        requested: u32,
        available: u32,
    },
    #[error("case store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("case store persistence failed: {0}")]
    Persistence(String),
}
