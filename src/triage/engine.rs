use std::{sync::Arc, time::Duration};

use crate::{
    case::{CaseId, CaseStorePort, CaseUpdate, UserId, bounded},
    catalog::{MedicineCatalogPort, MedicineId, SymptomCatalogPort, SymptomId},
    triage::{
        error::{TriageError, case_closed, catalog_failure, unknown_symptom},
        table::{self, Transition, TransitionInput},
        types::{AuditStatus, TriageAnswer, TriageContext, TriageState, TriageStep},
    },
};

#[derive(Debug, Clone)]
pub struct TriageSettings {
    pub fallback_medicine: Option<MedicineId>,
    pub io_timeout: Duration,
}

impl Default for TriageSettings {
    fn default() -> Self {
        Self {
            fallback_medicine: None,
            io_timeout: Duration::from_secs(5),
        }
    }
}

/// Drives the questionnaire. Holds no per-session state: callers keep the
/// returned [`TriageContext`] and hand it back with the next answer.
pub struct TriageEngine {
    symptoms: Arc<dyn SymptomCatalogPort>,
    medicines: Arc<dyn MedicineCatalogPort>,
    store: Arc<dyn CaseStorePort>,
    settings: TriageSettings,
}

impl TriageEngine {
    pub fn new(
        symptoms: Arc<dyn SymptomCatalogPort>,
        medicines: Arc<dyn MedicineCatalogPort>,
        store: Arc<dyn CaseStorePort>,
        settings: TriageSettings,
    ) -> Self {
        Self {
            symptoms,
            medicines,
            store,
            settings,
        }
    }

    pub async fn select_symptom(
        &self,
        user_id: &UserId,
        symptom_id: SymptomId,
    ) -> Result<TriageStep, TriageError> {
        let symptom = self.symptoms.get_symptom(symptom_id).map_err(|err| {
            if err.is_not_found() {
                unknown_symptom(err.message)
            } else {
                catalog_failure(format!("symptom lookup failed: {err}"))
            }
        })?;
        let suggested = self.resolve(symptom.suggested_medicine.as_ref())?;
        let fallback = self.resolve(self.settings.fallback_medicine.as_ref())?;

        let transition = table::on_symptom_selected(&TransitionInput {
            symptom: &symptom,
            suggested_medicine: suggested.as_ref(),
            fallback_medicine: fallback.as_ref(),
        });

        let (case_id, created) = match bounded(
            self.settings.io_timeout,
            self.store.create_case(user_id, symptom_id),
        )
        .await
        {
            Ok(case_id) => (Some(case_id), AuditStatus::Recorded),
            Err(err) => {
                tracing::warn!(
                    target: "triage",
                    user_id = %user_id,
                    symptom_id = %symptom_id,
                    error = %err,
                    "case_create_failed"
                );
                (None, AuditStatus::Failed(err.to_string()))
            }
        };

        let mut context = TriageContext {
            case_id,
            user_id: user_id.clone(),
            symptom,
            state: TriageState::SymptomSelected,
            answers: Default::default(),
        };
        // Fever-class symptoms imply the has-fever answer.
        context.answers.has_fever = transition.answer_update.has_fever;
        let mut step = self.apply(context, transition).await;
        step.audit = created.merge(step.audit);
        Ok(step)
    }

    pub async fn answer(
        &self,
        context: &TriageContext,
        answer: TriageAnswer,
    ) -> Result<TriageStep, TriageError> {
        if context.state.is_terminal() {
            return Err(case_closed(format!(
                "triage already finished in state '{}'",
                context.state
            )));
        }

        let suggested = self.resolve(context.symptom.suggested_medicine.as_ref())?;
        let fallback = self.resolve(self.settings.fallback_medicine.as_ref())?;
        let transition = table::transition(
            &context.state,
            &answer,
            &TransitionInput {
                symptom: &context.symptom,
                suggested_medicine: suggested.as_ref(),
                fallback_medicine: fallback.as_ref(),
            },
        )?;

        let mut next = context.clone();
        next.answers = context.answers.with_answer(&answer);
        Ok(self.apply(next, transition).await)
    }

    /// Looks a medicine reference up; a catalog miss means "no medicine",
    /// any other catalog failure is surfaced.
    fn resolve(
        &self,
        medicine_id: Option<&MedicineId>,
    ) -> Result<Option<MedicineId>, TriageError> {
        let Some(medicine_id) = medicine_id else {
            return Ok(None);
        };
        match self.medicines.get_medicine(medicine_id) {
            Ok(info) => Ok(Some(info.id)),
            Err(err) if err.is_not_found() => {
                tracing::warn!(
                    target: "triage",
                    medicine_id = %medicine_id,
                    reason = %err,
                    "medicine_reference_unresolved"
                );
                Ok(None)
            }
            Err(err) => Err(catalog_failure(format!("medicine lookup failed: {err}"))),
        }
    }

    /// Writes the collected answer first, then the routing fields.
    async fn apply(&self, mut context: TriageContext, transition: Transition) -> TriageStep {
        let Transition {
            next,
            answer_update,
            route_update,
        } = transition;

        let mut audit = self.write(context.case_id, answer_update).await;
        audit = audit.merge(self.write(context.case_id, route_update).await);

        tracing::info!(
            target: "triage",
            case_id = ?context.case_id,
            symptom_id = %context.symptom.id,
            from = %context.state,
            to = %next,
            audit_recorded = audit.is_recorded(),
            "triage_transition"
        );
        if let TriageState::ReferDoctor { reason } = &next {
            tracing::info!(
                target: "triage",
                case_id = ?context.case_id,
                reason = ?reason,
                "triage_referred_to_doctor"
            );
        }

        context.state = next;
        TriageStep { context, audit }
    }

    async fn write(&self, case_id: Option<CaseId>, update: CaseUpdate) -> AuditStatus {
        if update.is_empty() {
            return AuditStatus::Recorded;
        }
        let Some(case_id) = case_id else {
            return AuditStatus::Failed("case record was never created".to_string());
        };
        match bounded(self.settings.io_timeout, self.store.update_case(case_id, update)).await {
            Ok(()) => AuditStatus::Recorded,
            Err(err) => {
                tracing::warn!(
                    target: "triage",
                    case_id = %case_id,
                    error = %err,
                    "case_update_failed"
                );
                AuditStatus::Failed(err.to_string())
            }
        }
    }
}
