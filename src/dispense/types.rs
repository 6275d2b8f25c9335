use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    case::CaseId,
    catalog::MedicineId,
    dispense::error::{DispenseError, invalid_reference},
    triage::AuditStatus,
};

/// Correlation token sent with every dispense command. Derived only from the
/// case id so every attempt for one case reuses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

const CASE_PREFIX: &str = "case-";

impl RequestId {
    pub fn for_case(case_id: CaseId) -> Self {
        Self(format!("{CASE_PREFIX}{case_id}"))
    }

    /// Staff-triggered commands have no case and get a fresh token.
    pub fn manual() -> Self {
        Self(format!("manual-{}", Uuid::now_v7()))
    }

    pub fn parse(raw: &str) -> Result<Self, DispenseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid_reference("request_id must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn case_id(&self) -> Option<CaseId> {
        self.0
            .strip_prefix(CASE_PREFIX)
            .and_then(|id| id.parse::<u64>().ok())
            .map(CaseId)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DispenseState {
    Idle,
    Dispensing { attempt: u32 },
    Success,
    Timeout { attempt: u32 },
    Cancelled,
    /// Retry budget is spent; a staff member has to step in.
    ContactStaff,
}

impl DispenseState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Cancelled | Self::ContactStaff)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dispensing { .. } => "dispensing",
            Self::Success => "success",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::ContactStaff => "contact_staff",
        }
    }
}

impl fmt::Display for DispenseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the device said to the last command. An unavailable device never
/// aborts the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ack", rename_all = "snake_case")]
pub enum CommandAck {
    Acknowledged,
    Unavailable { reason: String },
}

impl CommandAck {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged)
    }
}

fn default_ok() -> bool {
    true
}

/// Body of a `dispense` acknowledgement. A 2xx body without `ok` counts as
/// accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispenseAck {
    #[serde(default = "default_ok")]
    pub ok: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub busy: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One dispense cycle for one case. Lives in the caller's session and is
/// handed back to the orchestrator on every step.
#[derive(Debug, Clone, PartialEq)]
pub struct DispenseAttempt {
    pub case_id: CaseId,
    pub medicine_id: MedicineId,
    pub slot: u8,
    pub request_id: RequestId,
    /// Dispense commands issued so far, the first one included.
    pub attempts: u32,
    pub retries: u32,
    pub deadline: Instant,
    pub state: DispenseState,
    pub last_ack: CommandAck,
    pub audit: AuditStatus,
}

/// Reference carried by the device callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionRef {
    Request(RequestId),
    Case(CaseId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    Recorded,
    Duplicate,
    /// The case was cancelled before the device reported back.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionAck {
    pub case_id: CaseId,
    pub outcome: CompletionOutcome,
}
