use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::{
    case::{
        AcceptMedicine, CaseId, CaseRecord, CaseStorePort, CaseUpdate, DispenseStatus, StoreError,
        bounded,
    },
    catalog::{MedicineCatalogPort, MedicineId},
    dispense::{
        error::{
            DispenseError, already_accepted, case_closed, catalog_unavailable,
            device_unavailable, invalid_reference, invalid_slot, medicine_mismatch, missing_case,
            not_retryable, retry_exhausted, store_unavailable, unknown_medicine,
        },
        ports::DeviceGatewayPort,
        types::{
            CommandAck, CompletionAck, CompletionOutcome, CompletionRef, DeviceStatus,
            DispenseAttempt, DispenseState, RequestId,
        },
    },
    triage::AuditStatus,
};

pub const MAX_RETRY: u32 = 2;

#[derive(Debug, Clone)]
pub struct DispenseSettings {
    pub max_wait: Duration,
    pub poll_interval: Duration,
    pub max_retry: u32,
    /// Upper bound on a single dispense command round trip.
    pub command_timeout: Duration,
    pub io_timeout: Duration,
}

impl Default for DispenseSettings {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(60_000),
            poll_interval: Duration::from_millis(800),
            max_retry: MAX_RETRY,
            command_timeout: Duration::from_millis(6_000),
            io_timeout: Duration::from_secs(5),
        }
    }
}

pub struct DispenseOrchestrator {
    medicines: Arc<dyn MedicineCatalogPort>,
    store: Arc<dyn CaseStorePort>,
    gateway: Arc<dyn DeviceGatewayPort>,
    settings: DispenseSettings,
}

impl DispenseOrchestrator {
    pub fn new(
        medicines: Arc<dyn MedicineCatalogPort>,
        store: Arc<dyn CaseStorePort>,
        gateway: Arc<dyn DeviceGatewayPort>,
        settings: DispenseSettings,
    ) -> Self {
        Self {
            medicines,
            store,
            gateway,
            settings,
        }
    }

    pub fn settings(&self) -> &DispenseSettings {
        &self.settings
    }

    /// Records the acceptance and fires the first dispense command. Returns
    /// as soon as the device acknowledged (or failed to); completion is
    /// observed through [`Self::poll`] or the device callback.
    pub async fn accept(
        &self,
        case_id: CaseId,
        medicine_id: &MedicineId,
    ) -> Result<DispenseAttempt, DispenseError> {
        let medicine = self.medicines.get_medicine(medicine_id).map_err(|err| {
            if err.is_not_found() {
                unknown_medicine(format!("medicine '{medicine_id}' is not in the catalog"))
            } else {
                catalog_unavailable(format!("medicine lookup failed: {err}"))
            }
        })?;
        if medicine.slot == 0 {
            return Err(invalid_slot(format!(
                "medicine '{medicine_id}' has no dispenser slot"
            )));
        }

        let record = self.load_case(case_id).await?;
        if record.dispense_status.is_terminal() {
            return Err(case_closed(format!(
                "case {case_id} is already '{}'",
                record.dispense_status
            )));
        }
        if record.medicine_id.as_ref() != Some(medicine_id) {
            return Err(medicine_mismatch(format!(
                "case {case_id} was not recommended '{medicine_id}'"
            )));
        }

        let audit = self
            .write(
                case_id,
                CaseUpdate {
                    accept_medicine: Some(AcceptMedicine::Accepted),
                    ..CaseUpdate::default()
                },
            )
            .await;

        let request_id = RequestId::for_case(case_id);
        let last_ack = self.issue(medicine.slot, &request_id).await;
        tracing::info!(
            target: "dispense",
            case_id = %case_id,
            medicine_id = %medicine_id,
            slot = medicine.slot,
            request_id = %request_id,
            acknowledged = last_ack.is_acknowledged(),
            "dispense_started"
        );

        Ok(DispenseAttempt {
            case_id,
            medicine_id: medicine.id,
            slot: medicine.slot,
            request_id,
            attempts: 1,
            retries: 0,
            deadline: Instant::now() + self.settings.max_wait,
            state: DispenseState::Dispensing { attempt: 1 },
            last_ack,
            audit,
        })
    }

    /// Declining before any command was sent. The device is never contacted.
    /// An unreadable case is still declined; an accepted one is not.
    pub async fn decline(&self, case_id: CaseId) -> Result<AuditStatus, DispenseError> {
        match self.store_case(case_id).await {
            Ok(record) if record.accept_medicine == AcceptMedicine::Accepted => {
                return Err(already_accepted(format!(
                    "case {case_id} was accepted and a dispense command was sent"
                )));
            }
            Err(StoreError::CaseNotFound(_)) => {
                return Err(missing_case(format!("case {case_id} does not exist")));
            }
            _ => {}
        }
        let update = CaseUpdate {
            accept_medicine: Some(AcceptMedicine::Declined),
            dispense_status: Some(DispenseStatus::Cancel),
            ..CaseUpdate::default()
        };
        match bounded(self.settings.io_timeout, self.store.update_case(case_id, update)).await {
            Ok(()) => {
                tracing::info!(target: "dispense", case_id = %case_id, "medicine_declined");
                Ok(AuditStatus::Recorded)
            }
            Err(StoreError::CaseClosed { status, .. }) => Err(case_closed(format!(
                "case {case_id} is already '{status}'"
            ))),
            Err(StoreError::CaseNotFound(_)) => {
                Err(missing_case(format!("case {case_id} does not exist")))
            }
            Err(err) => {
                tracing::warn!(
                    target: "dispense",
                    case_id = %case_id,
                    error = %err,
                    "decline_write_failed"
                );
                Ok(AuditStatus::Failed(err.to_string()))
            }
        }
    }

    /// One short status check. Never blocks for the whole wait window.
    pub async fn poll(&self, attempt: &DispenseAttempt) -> DispenseAttempt {
        let mut next = attempt.clone();
        if !matches!(attempt.state, DispenseState::Dispensing { .. }) {
            return next;
        }

        if let Ok(record) = self.store_case(attempt.case_id).await {
            match record.dispense_status {
                DispenseStatus::Success => {
                    next.state = DispenseState::Success;
                    return next;
                }
                DispenseStatus::Cancel => {
                    next.state = DispenseState::Cancelled;
                    return next;
                }
                _ => {}
            }
        }

        if Instant::now() >= attempt.deadline {
            return self.expire(next).await;
        }

        match tokio::time::timeout(self.settings.command_timeout, self.gateway.status()).await {
            Ok(Ok(status)) if !status.busy && attempt.last_ack.is_acknowledged() => {
                self.confirm_success(next).await
            }
            Ok(Ok(_)) => next,
            Ok(Err(err)) => {
                tracing::debug!(
                    target: "dispense",
                    case_id = %attempt.case_id,
                    error = %err,
                    "status_poll_failed"
                );
                next
            }
            Err(_) => {
                tracing::debug!(
                    target: "dispense",
                    case_id = %attempt.case_id,
                    "status_poll_timed_out"
                );
                next
            }
        }
    }

    /// Polls until the cycle leaves `Dispensing`.
    pub async fn await_completion(&self, attempt: &DispenseAttempt) -> DispenseAttempt {
        let mut current = self.poll(attempt).await;
        while matches!(current.state, DispenseState::Dispensing { .. }) {
            tokio::time::sleep(self.settings.poll_interval).await;
            current = self.poll(&current).await;
        }
        current
    }

    /// Re-issues the same request id after a timeout, while budget remains.
    pub async fn retry(&self, attempt: &DispenseAttempt) -> Result<DispenseAttempt, DispenseError> {
        match attempt.state {
            DispenseState::Timeout { .. } => {}
            DispenseState::ContactStaff => {
                return Err(retry_exhausted(format!(
                    "case {} used all {} retries, please contact staff",
                    attempt.case_id, self.settings.max_retry
                )));
            }
            other => {
                return Err(not_retryable(format!(
                    "cannot retry a dispense in state '{other}'"
                )));
            }
        }

        let mut next = attempt.clone();
        if attempt.retries >= self.settings.max_retry {
            next.state = DispenseState::ContactStaff;
            return Ok(next);
        }

        let already_done = self
            .store_case(attempt.case_id)
            .await
            .is_ok_and(|record| record.dispense_status == DispenseStatus::Success);
        if already_done {
            next.state = DispenseState::Success;
            return Ok(next);
        }

        next.retries += 1;
        next.attempts += 1;
        next.audit = self
            .write(attempt.case_id, CaseUpdate::status(DispenseStatus::Retry(next.retries)))
            .await;
        next.last_ack = self.issue(attempt.slot, &attempt.request_id).await;
        next.deadline = Instant::now() + self.settings.max_wait;
        next.state = DispenseState::Dispensing {
            attempt: next.attempts,
        };

        tracing::info!(
            target: "dispense",
            case_id = %attempt.case_id,
            request_id = %attempt.request_id,
            retry = next.retries,
            acknowledged = next.last_ack.is_acknowledged(),
            "dispense_retried"
        );
        Ok(next)
    }

    /// Stops client-side waiting. An in-flight physical dispense is not
    /// revoked.
    pub async fn cancel(&self, attempt: &DispenseAttempt) -> DispenseAttempt {
        let mut next = attempt.clone();
        if matches!(attempt.state, DispenseState::Success | DispenseState::Cancelled) {
            return next;
        }
        next.audit = self
            .write(attempt.case_id, CaseUpdate::status(DispenseStatus::Cancel))
            .await;
        next.state = DispenseState::Cancelled;
        tracing::info!(
            target: "dispense",
            case_id = %attempt.case_id,
            attempts = attempt.attempts,
            "dispense_cancelled"
        );
        next
    }

    /// Inbound device callback. Repeated callbacks for one case are
    /// acknowledged without touching the ledger twice.
    pub async fn on_dispense_complete(
        &self,
        reference: CompletionRef,
    ) -> Result<CompletionAck, DispenseError> {
        let case_id = match &reference {
            CompletionRef::Case(case_id) => *case_id,
            CompletionRef::Request(request_id) => request_id.case_id().ok_or_else(|| {
                invalid_reference(format!(
                    "request id '{request_id}' does not belong to a case"
                ))
            })?,
        };
        let record = match self.store_case(case_id).await {
            Ok(record) => record,
            Err(StoreError::CaseNotFound(_)) => {
                return Err(missing_case(format!("case {case_id} does not exist")));
            }
            Err(err) => {
                return Err(store_unavailable(format!(
                    "could not load case {case_id}: {err}"
                )));
            }
        };

        let outcome = match record.dispense_status {
            DispenseStatus::Success => CompletionOutcome::Duplicate,
            DispenseStatus::Cancel => CompletionOutcome::Ignored,
            _ if record.accept_medicine != AcceptMedicine::Accepted => {
                tracing::warn!(
                    target: "dispense",
                    case_id = %case_id,
                    accept_medicine = ?record.accept_medicine,
                    "dispense_callback_without_command"
                );
                CompletionOutcome::Ignored
            }
            _ => {
                let audit = self
                    .write(case_id, CaseUpdate::status(DispenseStatus::Success))
                    .await;
                if audit.is_recorded() {
                    if let Some(medicine_id) = &record.medicine_id {
                        self.decrement_stock(medicine_id, &RequestId::for_case(case_id))
                            .await;
                    }
                    CompletionOutcome::Recorded
                } else {
                    return Err(store_unavailable(format!(
                        "could not record completion for case {case_id}"
                    )));
                }
            }
        };

        tracing::info!(
            target: "dispense",
            case_id = %case_id,
            outcome = ?outcome,
            "dispense_callback_received"
        );
        Ok(CompletionAck { case_id, outcome })
    }

    /// Staff command that bypasses triage. The slot must belong to a
    /// catalog medicine.
    pub async fn manual_dispense(&self, slot: u8) -> Result<(RequestId, CommandAck), DispenseError> {
        let Some(medicine) = self.medicines.medicine_for_slot(slot) else {
            return Err(invalid_slot(format!("slot {slot} is not assigned to a medicine")));
        };
        let request_id = RequestId::manual();
        let ack = self.issue(slot, &request_id).await;
        tracing::info!(
            target: "dispense",
            slot = slot,
            medicine_id = %medicine.id,
            request_id = %request_id,
            acknowledged = ack.is_acknowledged(),
            "manual_dispense_issued"
        );
        Ok((request_id, ack))
    }

    pub async fn device_status(&self) -> Result<DeviceStatus, DispenseError> {
        match tokio::time::timeout(self.settings.command_timeout, self.gateway.status()).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(err)) => Err(device_unavailable(err.to_string())),
            Err(_) => Err(device_unavailable(format!(
                "dispenser did not answer within {:?}",
                self.settings.command_timeout
            ))),
        }
    }

    async fn issue(&self, slot: u8, request_id: &RequestId) -> CommandAck {
        let reason = match tokio::time::timeout(
            self.settings.command_timeout,
            self.gateway.dispense(slot, request_id),
        )
        .await
        {
            Ok(Ok(ack)) if ack.ok => return CommandAck::Acknowledged,
            Ok(Ok(_)) => "dispenser rejected the command".to_string(),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!(
                "dispenser did not acknowledge within {:?}",
                self.settings.command_timeout
            ),
        };
        tracing::warn!(
            target: "dispense",
            slot = slot,
            request_id = %request_id,
            reason = %reason,
            "dispense_command_failed"
        );
        CommandAck::Unavailable { reason }
    }

    async fn expire(&self, mut attempt: DispenseAttempt) -> DispenseAttempt {
        attempt.audit = self
            .write(attempt.case_id, CaseUpdate::status(DispenseStatus::Timeout))
            .await;
        attempt.state = if attempt.retries >= self.settings.max_retry {
            tracing::warn!(
                target: "dispense",
                case_id = %attempt.case_id,
                attempts = attempt.attempts,
                "dispense_retry_budget_exhausted"
            );
            DispenseState::ContactStaff
        } else {
            tracing::info!(
                target: "dispense",
                case_id = %attempt.case_id,
                attempt = attempt.attempts,
                "dispense_timed_out"
            );
            DispenseState::Timeout {
                attempt: attempt.attempts,
            }
        };
        attempt
    }

    async fn confirm_success(&self, mut attempt: DispenseAttempt) -> DispenseAttempt {
        attempt.audit = self
            .write(attempt.case_id, CaseUpdate::status(DispenseStatus::Success))
            .await;
        attempt.state = DispenseState::Success;
        self.decrement_stock(&attempt.medicine_id, &attempt.request_id)
            .await;
        tracing::info!(
            target: "dispense",
            case_id = %attempt.case_id,
            attempts = attempt.attempts,
            "dispense_succeeded"
        );
        attempt
    }

    /// Best effort. A ledger failure never downgrades a recorded success.
    async fn decrement_stock(&self, medicine_id: &MedicineId, request_id: &RequestId) {
        if let Err(err) = bounded(
            self.settings.io_timeout,
            self.store
                .decrement_stock(medicine_id, 1, request_id.as_str()),
        )
        .await
        {
            tracing::warn!(
                target: "dispense",
                medicine_id = %medicine_id,
                request_id = %request_id,
                error = %err,
                "stock_decrement_failed"
            );
        }
    }

    async fn write(&self, case_id: CaseId, update: CaseUpdate) -> AuditStatus {
        match bounded(self.settings.io_timeout, self.store.update_case(case_id, update)).await {
            Ok(()) => AuditStatus::Recorded,
            Err(err) => {
                tracing::warn!(
                    target: "dispense",
                    case_id = %case_id,
                    error = %err,
                    "case_update_failed"
                );
                AuditStatus::Failed(err.to_string())
            }
        }
    }

    async fn store_case(&self, case_id: CaseId) -> Result<CaseRecord, StoreError> {
        bounded(self.settings.io_timeout, self.store.get_case(case_id)).await
    }

    /// Nothing is dispensed for a case that cannot be read.
    async fn load_case(&self, case_id: CaseId) -> Result<CaseRecord, DispenseError> {
        match self.store_case(case_id).await {
            Ok(record) => Ok(record),
            Err(StoreError::CaseNotFound(_)) => {
                Err(missing_case(format!("case {case_id} does not exist")))
            }
            Err(err) => {
                tracing::warn!(
                    target: "dispense",
                    case_id = %case_id,
                    error = %err,
                    "case_lookup_failed"
                );
                Err(store_unavailable(format!("could not load case {case_id}: {err}")))
            }
        }
    }
}
