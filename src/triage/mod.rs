pub mod engine;
pub mod error;
pub mod table;
pub mod types;

pub use engine::{TriageEngine, TriageSettings};
pub use error::{TriageError, TriageErrorKind};
pub use table::{Transition, TransitionInput};
pub use types::{
    AuditStatus, Severity, TriageAnswer, TriageAnswers, TriageContext, TriageState, TriageStep,
    parse_symptom_id,
};
