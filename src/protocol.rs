//! NDJSON wire format. One JSON object per line, discriminated by `type`.

use serde::{Deserialize, Serialize, de::Error as _};
use serde_json::{Map, Value, json};
use tokio::time::Instant;

use crate::{
    case::{CaseId, ReferralReason, UserId},
    catalog::MedicineInfo,
    dispense::{CommandAck, CompletionRef, DispenseAttempt, DispenseState, RequestId},
    kiosk::{DispenseStep, KioskError},
    triage::{
        AuditStatus, Severity, TriageAnswer, TriageError, TriageState, TriageStep,
        error::validation,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Exit,
    ListSymptoms,
    SelectSymptom {
        session_id: String,
        user_id: UserId,
        symptom_id: Option<String>,
    },
    Answer {
        session_id: String,
        answer: AnswerPayload,
    },
    Accept {
        session_id: String,
    },
    Decline {
        session_id: String,
    },
    Poll {
        session_id: String,
    },
    Retry {
        session_id: String,
    },
    Cancel {
        session_id: String,
    },
    Goodbye {
        session_id: String,
    },
    DispenseComplete {
        reference: CompletionRef,
    },
    ManualDispense {
        slot: i64,
    },
    DeviceStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireMessageType {
    Exit,
    ListSymptoms,
    SelectSymptom,
    Answer,
    Accept,
    Decline,
    Poll,
    Retry,
    Cancel,
    Goodbye,
    DispenseComplete,
    ManualDispense,
    DeviceStatus,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoFields {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionFields {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectSymptomFields {
    session_id: String,
    user_id: String,
    #[serde(default)]
    symptom_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DispenseCompleteFields {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    case_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManualDispenseFields {
    slot: i64,
}

/// Answer as typed by the user. Severity stays raw until validated so a
/// malformed level is a validation error, not a protocol error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "question", rename_all = "snake_case")]
pub enum AnswerPayload {
    HasFever {
        yes: bool,
    },
    MusclePain {
        yes: bool,
    },
    Severity {
        #[serde(default)]
        level: Option<Value>,
        #[serde(default)]
        note: Option<String>,
    },
    Pregnant {
        yes: bool,
    },
    ParacetamolAllergy {
        yes: bool,
    },
}

impl AnswerPayload {
    pub fn into_answer(self) -> Result<TriageAnswer, TriageError> {
        let answer = match self {
            Self::HasFever { yes } => TriageAnswer::HasFever { yes },
            Self::MusclePain { yes } => TriageAnswer::MusclePain { yes },
            Self::Pregnant { yes } => TriageAnswer::Pregnant { yes },
            Self::ParacetamolAllergy { yes } => TriageAnswer::ParacetamolAllergy { yes },
            Self::Severity { level, note } => TriageAnswer::Severity {
                level: severity_from_value(level.as_ref())?,
                note: note.filter(|note| !note.trim().is_empty()),
            },
        };
        Ok(answer)
    }
}

fn severity_from_value(level: Option<&Value>) -> Result<Severity, TriageError> {
    match level {
        None | Some(Value::Null) => Err(validation("severity level is required")),
        Some(Value::String(raw)) => Severity::parse(raw),
        Some(Value::Number(number)) => match number.as_i64() {
            Some(level) => Severity::new(level),
            None => Err(validation(format!(
                "severity must be a whole number, got {number}"
            ))),
        },
        Some(other) => Err(validation(format!(
            "severity must be a whole number, got {other}"
        ))),
    }
}

fn symptom_id_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn fields<T: for<'de> Deserialize<'de>>(body: Map<String, Value>) -> serde_json::Result<T> {
    serde_json::from_value(Value::Object(body))
}

pub fn parse_client_message(line: &str) -> Result<ClientMessage, serde_json::Error> {
    let mut body: Map<String, Value> = serde_json::from_str(line)?;
    let kind = body
        .remove("type")
        .ok_or_else(|| serde_json::Error::missing_field("type"))?;
    let kind: WireMessageType = serde_json::from_value(kind)?;

    let message = match kind {
        WireMessageType::Exit => {
            fields::<NoFields>(body)?;
            ClientMessage::Exit
        }
        WireMessageType::ListSymptoms => {
            fields::<NoFields>(body)?;
            ClientMessage::ListSymptoms
        }
        WireMessageType::DeviceStatus => {
            fields::<NoFields>(body)?;
            ClientMessage::DeviceStatus
        }
        WireMessageType::SelectSymptom => {
            let wire: SelectSymptomFields = fields(body)?;
            ClientMessage::SelectSymptom {
                session_id: wire.session_id,
                user_id: UserId::new(wire.user_id),
                symptom_id: symptom_id_text(wire.symptom_id),
            }
        }
        WireMessageType::Answer => {
            let session_id = body
                .remove("session_id")
                .ok_or_else(|| serde_json::Error::missing_field("session_id"))?;
            ClientMessage::Answer {
                session_id: serde_json::from_value(session_id)?,
                answer: fields(body)?,
            }
        }
        WireMessageType::Accept => ClientMessage::Accept {
            session_id: fields::<SessionFields>(body)?.session_id,
        },
        WireMessageType::Decline => ClientMessage::Decline {
            session_id: fields::<SessionFields>(body)?.session_id,
        },
        WireMessageType::Poll => ClientMessage::Poll {
            session_id: fields::<SessionFields>(body)?.session_id,
        },
        WireMessageType::Retry => ClientMessage::Retry {
            session_id: fields::<SessionFields>(body)?.session_id,
        },
        WireMessageType::Cancel => ClientMessage::Cancel {
            session_id: fields::<SessionFields>(body)?.session_id,
        },
        WireMessageType::Goodbye => ClientMessage::Goodbye {
            session_id: fields::<SessionFields>(body)?.session_id,
        },
        WireMessageType::DispenseComplete => {
            let wire: DispenseCompleteFields = fields(body)?;
            let reference = match (wire.request_id, wire.case_id) {
                (Some(request_id), None) => CompletionRef::Request(
                    RequestId::parse(&request_id).map_err(serde_json::Error::custom)?,
                ),
                (None, Some(case_id)) => CompletionRef::Case(CaseId(case_id)),
                _ => {
                    return Err(serde_json::Error::custom(
                        "dispense_complete needs exactly one of request_id or case_id",
                    ));
                }
            };
            ClientMessage::DispenseComplete { reference }
        }
        WireMessageType::ManualDispense => ClientMessage::ManualDispense {
            slot: fields::<ManualDispenseFields>(body)?.slot,
        },
    };
    Ok(message)
}

#[derive(Debug, Serialize)]
pub struct MedicineView<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub slot: u8,
    pub image: Option<&'a str>,
    pub description: &'a str,
    pub usage: &'a str,
    pub doctor_advice: &'a str,
    pub warning: &'a str,
    pub audio_cue: &'a str,
}

impl<'a> From<&'a MedicineInfo> for MedicineView<'a> {
    fn from(info: &'a MedicineInfo) -> Self {
        Self {
            id: info.id.as_str(),
            name: &info.name,
            slot: info.slot,
            image: info.image.as_deref(),
            description: &info.description,
            usage: &info.usage,
            doctor_advice: &info.doctor_advice,
            warning: &info.warning,
            audio_cue: info.audio_cue_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReferralView {
    reason: ReferralReason,
    advice: &'static str,
}

#[derive(Debug, Serialize)]
struct AuditView<'a> {
    recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> From<&'a AuditStatus> for AuditView<'a> {
    fn from(audit: &'a AuditStatus) -> Self {
        match audit {
            AuditStatus::Recorded => Self {
                recorded: true,
                error: None,
            },
            AuditStatus::Failed(reason) => Self {
                recorded: false,
                error: Some(reason),
            },
        }
    }
}

pub fn triage_response(step: &TriageStep, medicine: Option<&MedicineInfo>) -> Value {
    let referral = step.context.referral_reason().map(|reason| ReferralView {
        reason,
        advice: reason.advice(),
    });
    json!({
        "ok": true,
        "case_id": step.context.case_id,
        "symptom_id": step.context.symptom.id,
        "state": step.state().name(),
        "terminal": step.state().is_terminal(),
        "question": pending_question(step.state()),
        "medicine": medicine.map(MedicineView::from),
        "referral": referral,
        "audit": AuditView::from(&step.audit),
    })
}

fn ack_view(ack: &CommandAck) -> Value {
    match ack {
        CommandAck::Acknowledged => json!({ "acknowledged": true }),
        CommandAck::Unavailable { reason } => json!({ "acknowledged": false, "reason": reason }),
    }
}

pub fn dispense_response(step: &DispenseStep) -> Value {
    let attempt: &DispenseAttempt = &step.attempt;
    let remaining_ms = match attempt.state {
        DispenseState::Dispensing { .. } => attempt
            .deadline
            .saturating_duration_since(Instant::now())
            .as_millis() as u64,
        _ => 0,
    };
    json!({
        "ok": true,
        "case_id": attempt.case_id,
        "request_id": attempt.request_id,
        "medicine_id": attempt.medicine_id,
        "slot": attempt.slot,
        "state": attempt.state.name(),
        "attempts": attempt.attempts,
        "retries": attempt.retries,
        "retries_left": step.max_retry.saturating_sub(attempt.retries),
        "remaining_ms": remaining_ms,
        "device": ack_view(&attempt.last_ack),
        "audit": AuditView::from(&attempt.audit),
    })
}

pub fn audit_response(audit: &AuditStatus) -> Value {
    json!({ "ok": true, "audit": AuditView::from(audit) })
}

pub fn command_response(request_id: &RequestId, ack: &CommandAck) -> Value {
    json!({ "ok": true, "request_id": request_id, "device": ack_view(ack) })
}

pub fn ok_response(mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert("ok".to_string(), Value::Bool(true));
    }
    body
}

pub fn error_response(code: &str, message: &str) -> Value {
    json!({ "ok": false, "error": { "code": code, "message": message } })
}

pub fn kiosk_error_response(err: &KioskError) -> Value {
    error_response(&err.code(), &err.to_string())
}

/// Name of the next question for a non-terminal state.
pub fn pending_question(state: &TriageState) -> Option<&'static str> {
    match state {
        TriageState::QuestionHasFever => Some("has_fever"),
        TriageState::QuestionFever => Some("muscle_pain"),
        TriageState::Severity => Some("severity"),
        TriageState::QuestionPregnant => Some("pregnant"),
        TriageState::QuestionAllergy => Some("paracetamol_allergy"),
        _ => None,
    }
}
