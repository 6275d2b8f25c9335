use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::catalog::{MedicineId, SymptomId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub u64);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted as `pending`, `success`, `cancel`, `timeout` or `retry{N}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DispenseStatus {
    #[default]
    Pending,
    Success,
    Cancel,
    Timeout,
    Retry(u32),
}

impl DispenseStatus {
    /// `success` and `cancel` close the case for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Cancel)
    }
}

impl fmt::Display for DispenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Success => f.write_str("success"),
            Self::Cancel => f.write_str("cancel"),
            Self::Timeout => f.write_str("timeout"),
            Self::Retry(attempt) => write!(f, "retry{attempt}"),
        }
    }
}

impl FromStr for DispenseStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "cancel" => Ok(Self::Cancel),
            "timeout" => Ok(Self::Timeout),
            other => other
                .strip_prefix("retry")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .map(Self::Retry)
                .ok_or_else(|| format!("unknown dispense status '{other}'")),
        }
    }
}

impl From<DispenseStatus> for String {
    fn from(status: DispenseStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for DispenseStatus {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptMedicine {
    #[default]
    Unset,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralReason {
    /// Muscle pain together with fever, possibly influenza.
    MusclePainWithFever,
    SeverityThreshold,
    Pregnancy,
    ParacetamolAllergy,
    NoSuitableMedicine,
}

impl ReferralReason {
    pub fn advice(self) -> &'static str {
        match self {
            Self::MusclePainWithFever => {
                "Muscle pain together with fever may be a sign of influenza or another illness that needs a doctor. Please see a doctor for diagnosis and treatment."
            }
            Self::SeverityThreshold => {
                "Your symptoms are fairly severe. Please see a doctor or a pharmacist near you."
            }
            Self::Pregnancy => {
                "You are pregnant. Please see a doctor or a pharmacist near you for specialised care."
            }
            Self::ParacetamolAllergy => {
                "You are allergic to paracetamol. Please see a doctor or a pharmacist near you for specialised care."
            }
            Self::NoSuitableMedicine => "No suitable medicine was found. Please consult a doctor.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: CaseId,
    pub user_id: UserId,
    pub symptom_id: SymptomId,
    #[serde(default)]
    pub has_fever: Option<bool>,
    #[serde(default)]
    pub muscle_pain: Option<bool>,
    #[serde(default)]
    pub severity: Option<u8>,
    #[serde(default)]
    pub severity_note: Option<String>,
    #[serde(default)]
    pub is_pregnant: Option<bool>,
    #[serde(default)]
    pub paracetamol_allergy: Option<bool>,
    #[serde(default)]
    pub medicine_id: Option<MedicineId>,
    #[serde(default)]
    pub referral_reason: Option<ReferralReason>,
    #[serde(default)]
    pub dispense_status: DispenseStatus,
    #[serde(default)]
    pub accept_medicine: AcceptMedicine,
    pub created_at: String,
}

impl CaseRecord {
    pub fn new(case_id: CaseId, user_id: UserId, symptom_id: SymptomId, created_at: String) -> Self {
        Self {
            case_id,
            user_id,
            symptom_id,
            has_fever: None,
            muscle_pain: None,
            severity: None,
            severity_note: None,
            is_pregnant: None,
            paracetamol_allergy: None,
            medicine_id: None,
            referral_reason: None,
            dispense_status: DispenseStatus::Pending,
            accept_medicine: AcceptMedicine::Unset,
            created_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.dispense_status.is_terminal()
    }
}

/// Partial update of a case record; `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaseUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_fever: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muscle_pain: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_note: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pregnant: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paracetamol_allergy: Option<bool>,
    /// `Some(None)` clears the selected medicine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medicine_id: Option<Option<MedicineId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_reason: Option<ReferralReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispense_status: Option<DispenseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_medicine: Option<AcceptMedicine>,
}

impl CaseUpdate {
    pub fn status(status: DispenseStatus) -> Self {
        Self {
            dispense_status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fields owned by the triage flow, frozen once dispensing starts.
    pub fn touches_triage_fields(&self) -> bool {
        self.has_fever.is_some()
            || self.muscle_pain.is_some()
            || self.severity.is_some()
            || self.severity_note.is_some()
            || self.is_pregnant.is_some()
            || self.paracetamol_allergy.is_some()
            || self.medicine_id.is_some()
            || self.referral_reason.is_some()
    }

    /// True when applying the update to `record` would change nothing.
    pub fn is_noop_for(&self, record: &CaseRecord) -> bool {
        let mut probe = record.clone();
        self.apply(&mut probe);
        probe == *record
    }

    pub fn apply(&self, record: &mut CaseRecord) {
        if let Some(value) = self.has_fever {
            record.has_fever = Some(value);
        }
        if let Some(value) = self.muscle_pain {
            record.muscle_pain = Some(value);
        }
        if let Some(value) = self.severity {
            record.severity = Some(value);
        }
        if let Some(value) = &self.severity_note {
            record.severity_note = value.clone();
        }
        if let Some(value) = self.is_pregnant {
            record.is_pregnant = Some(value);
        }
        if let Some(value) = self.paracetamol_allergy {
            record.paracetamol_allergy = Some(value);
        }
        if let Some(value) = &self.medicine_id {
            record.medicine_id = value.clone();
        }
        if let Some(value) = self.referral_reason {
            record.referral_reason = Some(value);
        }
        if let Some(value) = self.dispense_status {
            record.dispense_status = value;
        }
        if let Some(value) = self.accept_medicine {
            record.accept_medicine = value;
        }
    }
}
