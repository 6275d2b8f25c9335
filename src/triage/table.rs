//! Decision tree of the triage questionnaire.
//!
//! Every function here is pure: it maps the current state plus an immutable
//! input to the next state and the case writes that go with it. Answer writes
//! and routing writes are kept apart so the caller can persist the answer
//! before acting on the route.

use crate::{
    case::{CaseUpdate, DispenseStatus, ReferralReason},
    catalog::{MedicineId, SymptomClass, SymptomDefinition},
    triage::{
        error::{TriageError, case_closed, unexpected_answer},
        types::{TriageAnswer, TriageState},
    },
};

/// Read-only input to a transition. Medicine references are pre-resolved
/// against the medicine catalog; `None` means no usable medicine.
#[derive(Debug, Clone, Copy)]
pub struct TransitionInput<'a> {
    pub symptom: &'a SymptomDefinition,
    pub suggested_medicine: Option<&'a MedicineId>,
    /// Only consulted at the allergy step.
    pub fallback_medicine: Option<&'a MedicineId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: TriageState,
    pub answer_update: CaseUpdate,
    pub route_update: CaseUpdate,
}

impl Transition {
    fn to(next: TriageState, answer_update: CaseUpdate) -> Self {
        let route_update = route_update_for(&next);
        Self {
            next,
            answer_update,
            route_update,
        }
    }
}

fn refer(reason: ReferralReason) -> TriageState {
    TriageState::ReferDoctor { reason }
}

fn recommend(medicine_id: &MedicineId) -> TriageState {
    TriageState::Recommended {
        medicine_id: medicine_id.clone(),
    }
}

fn route_update_for(next: &TriageState) -> CaseUpdate {
    match next {
        TriageState::ReferDoctor { reason } => CaseUpdate {
            dispense_status: Some(DispenseStatus::Cancel),
            medicine_id: Some(None),
            referral_reason: Some(*reason),
            ..CaseUpdate::default()
        },
        TriageState::Recommended { medicine_id } => CaseUpdate {
            medicine_id: Some(Some(medicine_id.clone())),
            ..CaseUpdate::default()
        },
        _ => CaseUpdate::default(),
    }
}

pub fn on_symptom_selected(input: &TransitionInput<'_>) -> Transition {
    let symptom = input.symptom;

    if symptom.flags.recommend_immediately {
        let next = match input.suggested_medicine {
            Some(medicine_id) => recommend(medicine_id),
            None => refer(ReferralReason::NoSuitableMedicine),
        };
        return Transition::to(next, CaseUpdate::default());
    }

    if symptom.is_fever_class() {
        return Transition::to(
            TriageState::QuestionFever,
            CaseUpdate {
                has_fever: Some(true),
                ..CaseUpdate::default()
            },
        );
    }

    let next = if symptom.flags.skip_severity_check {
        TriageState::QuestionPregnant
    } else if symptom.flags.ask_has_fever {
        TriageState::QuestionHasFever
    } else {
        TriageState::Severity
    };
    Transition::to(next, CaseUpdate::default())
}

pub fn transition(
    state: &TriageState,
    answer: &TriageAnswer,
    input: &TransitionInput<'_>,
) -> Result<Transition, TriageError> {
    let answer_update = answer.to_case_update();
    let symptom = input.symptom;

    let next = match (state, answer) {
        (TriageState::QuestionHasFever, TriageAnswer::HasFever { yes: true }) => {
            match symptom.class {
                SymptomClass::MusclePain => refer(ReferralReason::MusclePainWithFever),
                SymptomClass::Headache => TriageState::QuestionFever,
                _ => TriageState::Severity,
            }
        }
        (TriageState::QuestionHasFever, TriageAnswer::HasFever { yes: false }) => {
            TriageState::Severity
        }

        (TriageState::QuestionFever, TriageAnswer::MusclePain { yes: true }) => {
            refer(ReferralReason::MusclePainWithFever)
        }
        (TriageState::QuestionFever, TriageAnswer::MusclePain { yes: false }) => {
            if symptom.is_fever_class() {
                TriageState::QuestionPregnant
            } else {
                TriageState::Severity
            }
        }

        (TriageState::Severity, TriageAnswer::Severity { level, .. }) => {
            if level.requires_referral() {
                refer(ReferralReason::SeverityThreshold)
            } else {
                TriageState::QuestionPregnant
            }
        }

        (TriageState::QuestionPregnant, TriageAnswer::Pregnant { yes: true }) => {
            refer(ReferralReason::Pregnancy)
        }
        (TriageState::QuestionPregnant, TriageAnswer::Pregnant { yes: false }) => {
            match (symptom.class, input.suggested_medicine) {
                (SymptomClass::Reflux, Some(medicine_id)) => recommend(medicine_id),
                _ => TriageState::QuestionAllergy,
            }
        }

        (TriageState::QuestionAllergy, TriageAnswer::ParacetamolAllergy { yes: true }) => {
            refer(ReferralReason::ParacetamolAllergy)
        }
        (TriageState::QuestionAllergy, TriageAnswer::ParacetamolAllergy { yes: false }) => {
            // The one place a configured default medicine may stand in for a missing mapping.
            match input.suggested_medicine.or(input.fallback_medicine) {
                Some(medicine_id) => recommend(medicine_id),
                None => refer(ReferralReason::NoSuitableMedicine),
            }
        }

        (state, _) if state.is_terminal() => {
            return Err(case_closed(format!(
                "triage already finished in state '{state}'"
            )));
        }
        (state, answer) => {
            return Err(unexpected_answer(format!(
                "answer '{}' does not belong to question '{}'",
                answer.name(),
                state
            )));
        }
    };

    Ok(Transition::to(next, answer_update))
}
