use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    case::{CaseId, CaseUpdate, ReferralReason, UserId},
    catalog::{MedicineId, SymptomDefinition, SymptomId},
    triage::error::{TriageError, invalid_symptom, validation},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TriageState {
    SymptomSelected,
    QuestionHasFever,
    QuestionFever,
    Severity,
    QuestionPregnant,
    QuestionAllergy,
    Recommended { medicine_id: MedicineId },
    ReferDoctor { reason: ReferralReason },
}

impl TriageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Recommended { .. } | Self::ReferDoctor { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SymptomSelected => "symptom_selected",
            Self::QuestionHasFever => "question_has_fever",
            Self::QuestionFever => "question_fever",
            Self::Severity => "severity",
            Self::QuestionPregnant => "question_pregnant",
            Self::QuestionAllergy => "question_allergy",
            Self::Recommended { .. } => "recommended",
            Self::ReferDoctor { .. } => "refer_doctor",
        }
    }
}

impl fmt::Display for TriageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pain/discomfort level on the 0..=10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const MAX: u8 = 10;
    pub const REFERRAL_THRESHOLD: u8 = 5;

    pub fn new(level: i64) -> Result<Self, TriageError> {
        if !(0..=i64::from(Self::MAX)).contains(&level) {
            return Err(validation(format!(
                "severity must be an integer between 0 and {}, got {level}",
                Self::MAX
            )));
        }
        Ok(Self(level as u8))
    }

    pub fn parse(raw: &str) -> Result<Self, TriageError> {
        let trimmed = raw.trim();
        let level = trimmed.parse::<i64>().map_err(|_| {
            validation(format!("severity must be an integer, got '{trimmed}'"))
        })?;
        Self::new(level)
    }

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn requires_referral(self) -> bool {
        self.0 >= Self::REFERRAL_THRESHOLD
    }
}

impl TryFrom<i64> for Severity {
    type Error = TriageError;

    fn try_from(level: i64) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "question", rename_all = "snake_case")]
pub enum TriageAnswer {
    HasFever { yes: bool },
    MusclePain { yes: bool },
    Severity {
        level: Severity,
        #[serde(default)]
        note: Option<String>,
    },
    Pregnant { yes: bool },
    ParacetamolAllergy { yes: bool },
}

impl TriageAnswer {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HasFever { .. } => "has_fever",
            Self::MusclePain { .. } => "muscle_pain",
            Self::Severity { .. } => "severity",
            Self::Pregnant { .. } => "pregnant",
            Self::ParacetamolAllergy { .. } => "paracetamol_allergy",
        }
    }

    /// Field writes that record this answer, before any routing.
    pub fn to_case_update(&self) -> CaseUpdate {
        match self {
            Self::HasFever { yes } => CaseUpdate {
                has_fever: Some(*yes),
                ..CaseUpdate::default()
            },
            Self::MusclePain { yes } => CaseUpdate {
                muscle_pain: Some(*yes),
                ..CaseUpdate::default()
            },
            Self::Severity { level, note } => CaseUpdate {
                severity: Some(level.level()),
                severity_note: Some(note.clone()),
                ..CaseUpdate::default()
            },
            Self::Pregnant { yes } => CaseUpdate {
                is_pregnant: Some(*yes),
                ..CaseUpdate::default()
            },
            Self::ParacetamolAllergy { yes } => CaseUpdate {
                paracetamol_allergy: Some(*yes),
                ..CaseUpdate::default()
            },
        }
    }
}

/// Answers collected so far in one triage session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageAnswers {
    pub has_fever: Option<bool>,
    pub muscle_pain: Option<bool>,
    pub severity: Option<Severity>,
    pub severity_note: Option<String>,
    pub is_pregnant: Option<bool>,
    pub paracetamol_allergy: Option<bool>,
}

impl TriageAnswers {
    pub fn with_answer(&self, answer: &TriageAnswer) -> Self {
        let mut next = self.clone();
        match answer {
            TriageAnswer::HasFever { yes } => next.has_fever = Some(*yes),
            TriageAnswer::MusclePain { yes } => next.muscle_pain = Some(*yes),
            TriageAnswer::Severity { level, note } => {
                next.severity = Some(*level);
                next.severity_note = note.clone();
            }
            TriageAnswer::Pregnant { yes } => next.is_pregnant = Some(*yes),
            TriageAnswer::ParacetamolAllergy { yes } => next.paracetamol_allergy = Some(*yes),
        }
        next
    }
}

/// Accumulated triage state passed between steps instead of ambient session data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageContext {
    pub case_id: Option<CaseId>,
    pub user_id: UserId,
    pub symptom: SymptomDefinition,
    pub state: TriageState,
    pub answers: TriageAnswers,
}

impl TriageContext {
    pub fn recommended_medicine(&self) -> Option<&MedicineId> {
        match &self.state {
            TriageState::Recommended { medicine_id } => Some(medicine_id),
            _ => None,
        }
    }

    pub fn referral_reason(&self) -> Option<ReferralReason> {
        match &self.state {
            TriageState::ReferDoctor { reason } => Some(*reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "audit", content = "reason", rename_all = "snake_case")]
pub enum AuditStatus {
    Recorded,
    Failed(String),
}

impl AuditStatus {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded)
    }

    pub fn merge(self, other: AuditStatus) -> AuditStatus {
        match (self, other) {
            (Self::Recorded, other) => other,
            (failed, _) => failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageStep {
    pub context: TriageContext,
    pub audit: AuditStatus,
}

impl TriageStep {
    pub fn state(&self) -> &TriageState {
        &self.context.state
    }
}

pub fn parse_symptom_id(raw: Option<&str>) -> Result<SymptomId, TriageError> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| invalid_symptom("a symptom must be selected"))?;
    raw.parse::<u32>()
        .map(SymptomId)
        .map_err(|_| invalid_symptom(format!("'{raw}' is not a valid symptom id")))
}
