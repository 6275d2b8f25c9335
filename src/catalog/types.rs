use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_AUDIO_CUE: &str = "default.mp3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymptomId(pub u32);

impl fmt::Display for SymptomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedicineId(pub String);

impl MedicineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MedicineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Routing class of a symptom. Only the classes with dedicated branches in
/// the decision tree are named; everything else is `General`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymptomClass {
    #[default]
    General,
    MusclePain,
    Headache,
    Reflux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymptomFlags {
    /// Fever is implied by the symptom itself; the has-fever question is skipped.
    #[serde(default)]
    pub asks_fever: bool,
    #[serde(default)]
    pub skip_severity_check: bool,
    #[serde(default)]
    pub ask_has_fever: bool,
    /// The suggested medicine is recommended without asking anything.
    #[serde(default)]
    pub recommend_immediately: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomDefinition {
    pub id: SymptomId,
    pub name: String,
    #[serde(default)]
    pub class: SymptomClass,
    #[serde(default)]
    pub flags: SymptomFlags,
    #[serde(default)]
    pub suggested_medicine: Option<MedicineId>,
}

impl SymptomDefinition {
    pub fn is_fever_class(&self) -> bool {
        self.flags.asks_fever
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineInfo {
    pub id: MedicineId,
    pub name: String,
    pub slot: u8,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub doctor_advice: String,
    #[serde(default)]
    pub warning: String,
    #[serde(default)]
    pub audio_cue: Option<String>,
}

impl MedicineInfo {
    pub fn audio_cue_or_default(&self) -> &str {
        self.audio_cue
            .as_deref()
            .map(str::trim)
            .filter(|cue| !cue.is_empty())
            .unwrap_or(DEFAULT_AUDIO_CUE)
    }
}
