//! Fakes shared by the integration harnesses.
#![allow(dead_code)]

use std::{
    collections::{BTreeMap, VecDeque},
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use medikiosk::{
    case::{
        CaseId, CaseRecord, CaseStorePort, CaseUpdate, MemoryCaseStore, StoreError, UserId,
    },
    catalog::{
        CatalogError, CatalogErrorKind, MedicineCatalogPort, MedicineId, MedicineInfo,
        StaticCatalog, SymptomId,
    },
    dispense::{
        DeviceError, DeviceGatewayPort, DeviceStatus, DispenseAck, DispenseOrchestrator,
        DispenseSettings, RequestId,
    },
    kiosk::Kiosk,
    triage::{TriageEngine, TriageSettings},
};

pub fn catalog() -> Arc<StaticCatalog> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("catalog.json5");
    Arc::new(StaticCatalog::load(&path).expect("bundled catalog should load"))
}

/// Medicine catalog whose backing source is down.
pub struct UnavailableMedicines;

impl MedicineCatalogPort for UnavailableMedicines {
    fn get_medicine(&self, _medicine_id: &MedicineId) -> Result<MedicineInfo, CatalogError> {
        Err(CatalogError::new(
            CatalogErrorKind::Unavailable,
            "catalog source offline",
        ))
    }

    fn medicine_for_slot(&self, _slot: u8) -> Option<MedicineInfo> {
        None
    }
}

pub fn paracetamol() -> MedicineId {
    MedicineId::new("paracetamol-500mg")
}

pub fn ors() -> MedicineId {
    MedicineId::new("ors")
}

pub fn gaviscon() -> MedicineId {
    MedicineId::new("gaviscon")
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Create(SymptomId),
    Update(CaseId, CaseUpdate),
    Decrement(MedicineId, String),
}

/// In-memory store that records every write and can be told to fail.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryCaseStore,
    calls: Mutex<Vec<StoreCall>>,
    fail_creates: AtomicBool,
    fail_reads: AtomicBool,
    fail_updates: AtomicBool,
    fail_decrements: AtomicBool,
}

impl RecordingStore {
    pub fn with_stock(stock: &[(MedicineId, u32)]) -> Self {
        Self {
            inner: MemoryCaseStore::with_stock(stock.iter().cloned().collect::<BTreeMap<_, _>>()),
            ..Self::default()
        }
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_decrements(&self, fail: bool) {
        self.fail_decrements.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn updates(&self) -> Vec<CaseUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Update(_, update) => Some(update),
                _ => None,
            })
            .collect()
    }

    pub fn decrements(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::Decrement(..)))
            .count()
    }

    pub async fn record(&self, case_id: CaseId) -> CaseRecord {
        self.inner.get_case(case_id).await.expect("case should exist")
    }

    pub async fn stock(&self, medicine_id: &MedicineId) -> Option<u32> {
        self.inner.stock_level(medicine_id).await
    }

    fn push(&self, call: StoreCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl CaseStorePort for RecordingStore {
    async fn create_case(
        &self,
        user_id: &UserId,
        symptom_id: SymptomId,
    ) -> Result<CaseId, StoreError> {
        self.push(StoreCall::Create(symptom_id));
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence("database offline".to_string()));
        }
        self.inner.create_case(user_id, symptom_id).await
    }

    async fn update_case(&self, case_id: CaseId, update: CaseUpdate) -> Result<(), StoreError> {
        self.push(StoreCall::Update(case_id, update.clone()));
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence("database offline".to_string()));
        }
        self.inner.update_case(case_id, update).await
    }

    async fn get_case(&self, case_id: CaseId) -> Result<CaseRecord, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence("database offline".to_string()));
        }
        self.inner.get_case(case_id).await
    }

    async fn decrement_stock(
        &self,
        medicine_id: &MedicineId,
        qty: u32,
        reference_id: &str,
    ) -> Result<(), StoreError> {
        self.push(StoreCall::Decrement(
            medicine_id.clone(),
            reference_id.to_string(),
        ));
        if self.fail_decrements.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence("ledger offline".to_string()));
        }
        self.inner.decrement_stock(medicine_id, qty, reference_id).await
    }
}

/// Dispenser fake. Status answers are scripted; once the script runs dry
/// the device reports busy forever.
#[derive(Default)]
pub struct ScriptedGateway {
    dispensed: Mutex<Vec<(u8, RequestId)>>,
    statuses: Mutex<VecDeque<Result<DeviceStatus, DeviceError>>>,
    unreachable: AtomicBool,
    status_calls: Mutex<usize>,
}

impl ScriptedGateway {
    pub fn unreachable() -> Self {
        let gateway = Self::default();
        gateway.unreachable.store(true, Ordering::SeqCst);
        gateway
    }

    pub fn push_status(&self, busy: bool) {
        self.statuses
            .lock()
            .expect("status lock")
            .push_back(Ok(status(busy)));
    }

    pub fn push_status_error(&self, err: DeviceError) {
        self.statuses.lock().expect("status lock").push_back(Err(err));
    }

    pub fn dispensed(&self) -> Vec<(u8, RequestId)> {
        self.dispensed.lock().expect("dispense lock").clone()
    }

    pub fn status_calls(&self) -> usize {
        *self.status_calls.lock().expect("status calls lock")
    }
}

pub fn status(busy: bool) -> DeviceStatus {
    DeviceStatus {
        busy,
        extra: Default::default(),
    }
}

#[async_trait]
impl DeviceGatewayPort for ScriptedGateway {
    async fn dispense(
        &self,
        slot: u8,
        request_id: &RequestId,
    ) -> Result<DispenseAck, DeviceError> {
        self.dispensed
            .lock()
            .expect("dispense lock")
            .push((slot, request_id.clone()));
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(DeviceError::Unreachable("connection refused".to_string()));
        }
        Ok(DispenseAck {
            ok: true,
            extra: Default::default(),
        })
    }

    async fn status(&self) -> Result<DeviceStatus, DeviceError> {
        *self.status_calls.lock().expect("status calls lock") += 1;
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(DeviceError::Unreachable("connection refused".to_string()));
        }
        self.statuses
            .lock()
            .expect("status lock")
            .pop_front()
            .unwrap_or_else(|| Ok(status(true)))
    }
}

pub fn triage_engine(store: Arc<RecordingStore>, fallback: Option<MedicineId>) -> TriageEngine {
    let catalog = catalog();
    TriageEngine::new(
        catalog.clone(),
        catalog,
        store,
        TriageSettings {
            fallback_medicine: fallback,
            io_timeout: Duration::from_secs(1),
        },
    )
}

pub fn dispense_settings() -> DispenseSettings {
    DispenseSettings {
        max_wait: Duration::from_secs(60),
        poll_interval: Duration::from_millis(800),
        max_retry: 2,
        command_timeout: Duration::from_secs(6),
        io_timeout: Duration::from_secs(1),
    }
}

pub fn orchestrator(
    store: Arc<RecordingStore>,
    gateway: Arc<ScriptedGateway>,
) -> DispenseOrchestrator {
    DispenseOrchestrator::new(catalog(), store, gateway, dispense_settings())
}

pub fn kiosk(store: Arc<RecordingStore>, gateway: Arc<ScriptedGateway>) -> Kiosk {
    let catalog = catalog();
    Kiosk::new(
        catalog.clone(),
        catalog,
        triage_engine(store.clone(), None),
        orchestrator(store, gateway),
    )
}
