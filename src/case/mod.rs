pub mod error;
pub mod memory;
pub mod persistence;
pub mod ports;
pub mod types;

pub use error::StoreError;
pub use memory::{CaseStoreSnapshot, MemoryCaseStore};
pub use persistence::CaseStorePersistence;
pub use ports::{CaseStorePort, bounded};
pub use types::{
    AcceptMedicine, CaseId, CaseRecord, CaseUpdate, DispenseStatus, ReferralReason, UserId,
};
