//! Session facade. Keeps one current case per kiosk session and routes
//! commands to the triage engine and the dispense orchestrator.

use std::{collections::BTreeMap, sync::Arc};

use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    case::{CaseId, UserId},
    catalog::{
        MedicineCatalogPort, MedicineId, MedicineInfo, SymptomCatalogPort, SymptomDefinition,
    },
    dispense::{
        CommandAck, CompletionAck, CompletionRef, DeviceStatus, DispenseAttempt, DispenseError,
        DispenseOrchestrator, DispenseState, RequestId, error::missing_case,
    },
    triage::{
        AuditStatus, TriageAnswer, TriageContext, TriageEngine, TriageError, TriageState,
        TriageStep, parse_symptom_id,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KioskError {
    #[error(transparent)]
    Triage(#[from] TriageError),
    #[error(transparent)]
    Dispense(#[from] DispenseError),
    #[error("no active session '{0}'")]
    UnknownSession(String),
    #[error("{0}")]
    InvalidStep(String),
}

impl KioskError {
    /// Stable snake_case code for the wire.
    pub fn code(&self) -> String {
        let value = match self {
            Self::Triage(err) => serde_json::to_value(err.kind),
            Self::Dispense(err) => serde_json::to_value(err.kind),
            Self::UnknownSession(_) => return "unknown_session".to_string(),
            Self::InvalidStep(_) => return "invalid_step".to_string(),
        };
        value
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| "internal".to_string())
    }
}

#[derive(Debug, Clone, Copy)]
enum CycleCommand {
    Poll,
    Retry,
    Cancel,
}

#[derive(Debug, Clone)]
pub struct KioskSession {
    pub user_id: UserId,
    pub triage: TriageContext,
    pub dispense: Option<DispenseAttempt>,
}

/// The dispense cycle as it stands after a command.
#[derive(Debug, Clone, PartialEq)]
pub struct DispenseStep {
    pub attempt: DispenseAttempt,
    pub max_retry: u32,
}

pub struct Kiosk {
    symptoms: Arc<dyn SymptomCatalogPort>,
    medicines: Arc<dyn MedicineCatalogPort>,
    triage: TriageEngine,
    dispense: DispenseOrchestrator,
    sessions: Mutex<BTreeMap<String, Arc<Mutex<KioskSession>>>>,
}

impl Kiosk {
    pub fn new(
        symptoms: Arc<dyn SymptomCatalogPort>,
        medicines: Arc<dyn MedicineCatalogPort>,
        triage: TriageEngine,
        dispense: DispenseOrchestrator,
    ) -> Self {
        Self {
            symptoms,
            medicines,
            triage,
            dispense,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn list_symptoms(&self) -> Vec<SymptomDefinition> {
        self.symptoms.list_symptoms()
    }

    pub fn medicine_info(&self, step: &TriageStep) -> Option<MedicineInfo> {
        step.context
            .recommended_medicine()
            .and_then(|medicine_id| self.medicines.get_medicine(medicine_id).ok())
    }

    /// Starts a new case for the session, replacing any current one.
    pub async fn select_symptom(
        &self,
        session_id: &str,
        user_id: &UserId,
        raw_symptom: Option<&str>,
    ) -> Result<TriageStep, KioskError> {
        let symptom_id = parse_symptom_id(raw_symptom)?;
        let step = self.triage.select_symptom(user_id, symptom_id).await?;

        let session = KioskSession {
            user_id: user_id.clone(),
            triage: step.context.clone(),
            dispense: None,
        };
        let replaced = self
            .sessions
            .lock()
            .await
            .insert(session_id.to_string(), Arc::new(Mutex::new(session)));
        if replaced.is_some() {
            tracing::info!(
                target: "kiosk",
                session_id = %session_id,
                "session_case_replaced"
            );
        }
        Ok(step)
    }

    pub async fn answer(
        &self,
        session_id: &str,
        answer: TriageAnswer,
    ) -> Result<TriageStep, KioskError> {
        let session = self.session(session_id).await?;
        let mut session = session.lock().await;
        let step = self.triage.answer(&session.triage, answer).await?;
        session.triage = step.context.clone();
        Ok(step)
    }

    /// Accepting twice returns the cycle already in progress instead of
    /// issuing a second command.
    pub async fn accept(&self, session_id: &str) -> Result<DispenseStep, KioskError> {
        let session = self.session(session_id).await?;
        let mut session = session.lock().await;
        if let Some(attempt) = &session.dispense {
            return Ok(self.dispense_step(attempt.clone()));
        }

        let (case_id, medicine_id) = recommended(&session.triage)?;
        let attempt = self.dispense.accept(case_id, &medicine_id).await?;
        session.dispense = Some(attempt.clone());
        Ok(self.dispense_step(attempt))
    }

    pub async fn decline(&self, session_id: &str) -> Result<AuditStatus, KioskError> {
        let session = self.session(session_id).await?;
        let session = session.lock().await;
        if session.dispense.is_some() {
            return Err(KioskError::InvalidStep(
                "dispensing already started, cancel it instead".to_string(),
            ));
        }
        let (case_id, _) = recommended(&session.triage)?;
        Ok(self.dispense.decline(case_id).await?)
    }

    pub async fn poll(&self, session_id: &str) -> Result<DispenseStep, KioskError> {
        self.advance(session_id, CycleCommand::Poll).await
    }

    pub async fn retry(&self, session_id: &str) -> Result<DispenseStep, KioskError> {
        self.advance(session_id, CycleCommand::Retry).await
    }

    pub async fn cancel(&self, session_id: &str) -> Result<DispenseStep, KioskError> {
        self.advance(session_id, CycleCommand::Cancel).await
    }

    /// Ends the session. Returns whether one existed.
    pub async fn goodbye(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(session_id);
        if let Some(session) = &removed {
            let session = session.lock().await;
            tracing::info!(
                target: "kiosk",
                session_id = %session_id,
                case_id = ?session.triage.case_id,
                dispense_state = ?session.dispense.as_ref().map(|attempt| attempt.state),
                "session_closed"
            );
        }
        removed.is_some()
    }

    pub async fn dispense_complete(
        &self,
        reference: CompletionRef,
    ) -> Result<CompletionAck, KioskError> {
        Ok(self.dispense.on_dispense_complete(reference).await?)
    }

    pub async fn manual_dispense(&self, slot: u8) -> Result<(RequestId, CommandAck), KioskError> {
        Ok(self.dispense.manual_dispense(slot).await?)
    }

    pub async fn device_status(&self) -> Result<DeviceStatus, KioskError> {
        Ok(self.dispense.device_status().await?)
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn session(&self, session_id: &str) -> Result<Arc<Mutex<KioskSession>>, KioskError> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| KioskError::UnknownSession(session_id.to_string()))
    }

    async fn advance(
        &self,
        session_id: &str,
        command: CycleCommand,
    ) -> Result<DispenseStep, KioskError> {
        let session = self.session(session_id).await?;
        let mut session = session.lock().await;
        let Some(attempt) = &session.dispense else {
            return Err(KioskError::InvalidStep(
                "no dispense in progress for this session".to_string(),
            ));
        };
        let next = match command {
            CycleCommand::Poll => self.dispense.poll(attempt).await,
            CycleCommand::Retry => self.dispense.retry(attempt).await?,
            CycleCommand::Cancel => self.dispense.cancel(attempt).await,
        };
        session.dispense = Some(next.clone());
        Ok(self.dispense_step(next))
    }

    fn dispense_step(&self, attempt: DispenseAttempt) -> DispenseStep {
        DispenseStep {
            attempt,
            max_retry: self.dispense.settings().max_retry,
        }
    }
}

fn recommended(context: &TriageContext) -> Result<(CaseId, MedicineId), KioskError> {
    let TriageState::Recommended { medicine_id } = &context.state else {
        return Err(KioskError::InvalidStep(format!(
            "no medicine recommended yet (state '{}')",
            context.state
        )));
    };
    let case_id = context
        .case_id
        .ok_or_else(|| missing_case("case record was never created, please contact staff"))?;
    Ok((case_id, medicine_id.clone()))
}

impl DispenseStep {
    pub fn state(&self) -> DispenseState {
        self.attempt.state
    }
}
