#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use medikiosk::{
    case::{AcceptMedicine, DispenseStatus, ReferralReason, UserId},
    catalog::SymptomId,
    triage::{
        AuditStatus, Severity, TriageAnswer, TriageErrorKind, TriageState, TriageStep,
        parse_symptom_id,
    },
};

use support::{RecordingStore, StoreCall, gaviscon, ors, paracetamol, triage_engine};

fn user() -> UserId {
    UserId::new("kiosk-user-1")
}

fn severity(level: i64) -> TriageAnswer {
    TriageAnswer::Severity {
        level: Severity::new(level).expect("level should be in range"),
        note: Some("since this morning".to_string()),
    }
}

async fn answer_all(
    engine: &medikiosk::triage::TriageEngine,
    mut step: TriageStep,
    answers: Vec<TriageAnswer>,
) -> TriageStep {
    for answer in answers {
        step = engine
            .answer(&step.context, answer)
            .await
            .expect("answer should be accepted");
    }
    step
}

#[tokio::test]
async fn given_directly_mapped_symptom_when_selected_then_medicine_is_recommended_without_questions()
 {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store.clone(), None);

    let step = engine
        .select_symptom(&user(), SymptomId(3))
        .await
        .expect("fatigue from diarrhea should be known");

    assert_eq!(
        step.state(),
        &TriageState::Recommended { medicine_id: ors() }
    );
    assert!(step.audit.is_recorded());
    let case_id = step.context.case_id.expect("case should be created");
    let record = store.record(case_id).await;
    assert_eq!(record.medicine_id, Some(ors()));
    assert_eq!(record.dispense_status, DispenseStatus::Pending);
    assert_eq!(record.accept_medicine, AcceptMedicine::Unset);
    assert_eq!(record.has_fever, None);
}

#[tokio::test]
async fn given_muscle_pain_when_fever_is_reported_then_doctor_referral_cancels_the_case() {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store.clone(), None);

    let step = engine
        .select_symptom(&user(), SymptomId(2))
        .await
        .expect("muscle pain should be known");
    assert_eq!(step.state(), &TriageState::QuestionHasFever);

    let step = answer_all(&engine, step, vec![TriageAnswer::HasFever { yes: true }]).await;
    assert_eq!(
        step.state(),
        &TriageState::ReferDoctor {
            reason: ReferralReason::MusclePainWithFever
        }
    );
    assert_eq!(
        step.context.referral_reason(),
        Some(ReferralReason::MusclePainWithFever)
    );

    let record = store
        .record(step.context.case_id.expect("case id"))
        .await;
    assert_eq!(record.has_fever, Some(true));
    assert_eq!(record.dispense_status, DispenseStatus::Cancel);
    assert_eq!(record.medicine_id, None);
    assert_eq!(
        record.referral_reason,
        Some(ReferralReason::MusclePainWithFever)
    );
}

#[tokio::test]
async fn given_headache_without_fever_when_all_answers_are_negative_then_allergy_step_recommends() {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store.clone(), None);

    let step = engine
        .select_symptom(&user(), SymptomId(1))
        .await
        .expect("headache should be known");
    let step = answer_all(
        &engine,
        step,
        vec![
            TriageAnswer::HasFever { yes: false },
            severity(3),
            TriageAnswer::Pregnant { yes: false },
        ],
    )
    .await;
    assert_eq!(step.state(), &TriageState::QuestionAllergy);

    let step = answer_all(
        &engine,
        step,
        vec![TriageAnswer::ParacetamolAllergy { yes: false }],
    )
    .await;
    assert_eq!(
        step.state(),
        &TriageState::Recommended {
            medicine_id: paracetamol()
        }
    );

    let record = store
        .record(step.context.case_id.expect("case id"))
        .await;
    assert_eq!(record.has_fever, Some(false));
    assert_eq!(record.severity, Some(3));
    assert_eq!(record.severity_note.as_deref(), Some("since this morning"));
    assert_eq!(record.is_pregnant, Some(false));
    assert_eq!(record.paracetamol_allergy, Some(false));
    assert_eq!(record.medicine_id, Some(paracetamol()));
    assert_eq!(record.dispense_status, DispenseStatus::Pending);
}

#[tokio::test]
async fn given_muscle_pain_without_fever_when_answered_then_severity_is_asked() {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store, None);

    let step = engine
        .select_symptom(&user(), SymptomId(2))
        .await
        .expect("muscle pain should be known");
    let step = answer_all(&engine, step, vec![TriageAnswer::HasFever { yes: false }]).await;
    assert_eq!(step.state(), &TriageState::Severity);
}

#[tokio::test]
async fn given_skip_severity_symptom_when_not_pregnant_then_mapped_medicine_passes_through() {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store.clone(), None);

    let step = engine
        .select_symptom(&user(), SymptomId(4))
        .await
        .expect("reflux should be known");
    assert_eq!(step.state(), &TriageState::QuestionPregnant);

    let step = answer_all(&engine, step, vec![TriageAnswer::Pregnant { yes: false }]).await;
    assert_eq!(
        step.state(),
        &TriageState::Recommended {
            medicine_id: gaviscon()
        }
    );
    assert_eq!(step.context.answers.severity, None);
}

#[tokio::test]
async fn given_any_severity_when_answered_then_threshold_decides_the_route() {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store, None);

    for level in 0..=Severity::MAX as i64 {
        let step = engine
            .select_symptom(&user(), SymptomId(5))
            .await
            .expect("toothache should be known");
        assert_eq!(step.state(), &TriageState::Severity);

        let step = answer_all(&engine, step, vec![severity(level)]).await;
        if level >= 5 {
            assert_eq!(
                step.state(),
                &TriageState::ReferDoctor {
                    reason: ReferralReason::SeverityThreshold
                },
                "level {level} must be referred"
            );
        } else {
            assert_eq!(
                step.state(),
                &TriageState::QuestionPregnant,
                "level {level} must continue"
            );
        }
    }
}

#[test]
fn given_out_of_range_or_fractional_severity_when_parsed_then_validation_fails() {
    for level in [-1, 11, 100] {
        let err = Severity::new(level).expect_err("out of range must fail");
        assert_eq!(err.kind, TriageErrorKind::Validation);
    }
    for raw in ["4.5", "five", ""] {
        let err = Severity::parse(raw).expect_err("non-integer must fail");
        assert_eq!(err.kind, TriageErrorKind::Validation);
    }
    assert_eq!(Severity::parse(" 7 ").expect("valid").level(), 7);
}

#[tokio::test]
async fn given_fever_symptom_when_selected_then_has_fever_question_is_skipped() {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store.clone(), None);

    let step = engine
        .select_symptom(&user(), SymptomId(8))
        .await
        .expect("fever should be known");
    assert_eq!(step.state(), &TriageState::QuestionFever);
    assert_eq!(step.context.answers.has_fever, Some(true));
    let record = store
        .record(step.context.case_id.expect("case id"))
        .await;
    assert_eq!(record.has_fever, Some(true));

    let step = answer_all(&engine, step, vec![TriageAnswer::MusclePain { yes: false }]).await;
    assert_eq!(step.state(), &TriageState::QuestionPregnant);
}

#[tokio::test]
async fn given_pregnancy_when_answered_then_doctor_referral() {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store, None);

    let step = engine
        .select_symptom(&user(), SymptomId(4))
        .await
        .expect("reflux should be known");
    let step = answer_all(&engine, step, vec![TriageAnswer::Pregnant { yes: true }]).await;
    assert_eq!(
        step.state(),
        &TriageState::ReferDoctor {
            reason: ReferralReason::Pregnancy
        }
    );
}

#[tokio::test]
async fn given_symptom_without_medicine_when_allergy_step_is_reached_then_referral_unless_fallback()
{
    let answers = || {
        vec![
            severity(2),
            TriageAnswer::Pregnant { yes: false },
            TriageAnswer::ParacetamolAllergy { yes: false },
        ]
    };

    let engine = triage_engine(Arc::new(RecordingStore::default()), None);
    let step = engine
        .select_symptom(&user(), SymptomId(6))
        .await
        .expect("sore throat should be known");
    let step = answer_all(&engine, step, answers()).await;
    assert_eq!(
        step.state(),
        &TriageState::ReferDoctor {
            reason: ReferralReason::NoSuitableMedicine
        }
    );

    let engine = triage_engine(Arc::new(RecordingStore::default()), Some(paracetamol()));
    let step = engine
        .select_symptom(&user(), SymptomId(6))
        .await
        .expect("sore throat should be known");
    let step = answer_all(&engine, step, answers()).await;
    assert_eq!(
        step.state(),
        &TriageState::Recommended {
            medicine_id: paracetamol()
        }
    );
}

#[tokio::test]
async fn given_allergy_when_answered_then_referral_even_with_fallback() {
    let engine = triage_engine(Arc::new(RecordingStore::default()), Some(paracetamol()));
    let step = engine
        .select_symptom(&user(), SymptomId(5))
        .await
        .expect("toothache should be known");
    let step = answer_all(
        &engine,
        step,
        vec![
            severity(1),
            TriageAnswer::Pregnant { yes: false },
            TriageAnswer::ParacetamolAllergy { yes: true },
        ],
    )
    .await;
    assert_eq!(
        step.state(),
        &TriageState::ReferDoctor {
            reason: ReferralReason::ParacetamolAllergy
        }
    );
}

#[tokio::test]
async fn given_missing_or_malformed_symptom_when_parsed_then_invalid_symptom() {
    for raw in [None, Some(""), Some("  "), Some("abc"), Some("-3")] {
        let err = parse_symptom_id(raw).expect_err("must be rejected");
        assert_eq!(err.kind, TriageErrorKind::InvalidSymptom, "input {raw:?}");
    }
    assert_eq!(parse_symptom_id(Some("4")).expect("valid"), SymptomId(4));
}

#[tokio::test]
async fn given_unknown_symptom_when_selected_then_no_case_is_created() {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store.clone(), None);

    let err = engine
        .select_symptom(&user(), SymptomId(99))
        .await
        .expect_err("symptom 99 is not in the catalog");
    assert_eq!(err.kind, TriageErrorKind::UnknownSymptom);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn given_answer_when_persisted_then_answer_write_precedes_routing_write() {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store.clone(), None);

    let step = engine
        .select_symptom(&user(), SymptomId(2))
        .await
        .expect("muscle pain should be known");
    let case_id = step.context.case_id.expect("case id");
    answer_all(&engine, step, vec![TriageAnswer::HasFever { yes: true }]).await;

    let calls = store.calls();
    assert_eq!(calls[0], StoreCall::Create(SymptomId(2)));
    let StoreCall::Update(first_case, first) = &calls[1] else {
        panic!("expected the answer write, got {:?}", calls[1]);
    };
    let StoreCall::Update(_, second) = &calls[2] else {
        panic!("expected the routing write, got {:?}", calls[2]);
    };
    assert_eq!(*first_case, case_id);
    assert_eq!(first.has_fever, Some(true));
    assert_eq!(first.dispense_status, None);
    assert_eq!(second.dispense_status, Some(DispenseStatus::Cancel));
    assert_eq!(second.medicine_id, Some(None));
    assert_eq!(calls.len(), 3);
}

#[tokio::test]
async fn given_failing_store_when_answering_then_flow_continues_with_failed_audit() {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store.clone(), None);

    let step = engine
        .select_symptom(&user(), SymptomId(1))
        .await
        .expect("headache should be known");
    store.fail_updates(true);

    let step = engine
        .answer(&step.context, TriageAnswer::HasFever { yes: false })
        .await
        .expect("the decision tree must not abort");
    assert_eq!(step.state(), &TriageState::Severity);
    assert!(matches!(step.audit, AuditStatus::Failed(_)));
    assert_eq!(step.context.answers.has_fever, Some(false));
}

#[tokio::test]
async fn given_case_creation_failure_when_selecting_then_triage_runs_unrecorded() {
    let store = Arc::new(RecordingStore::default());
    store.fail_creates(true);
    let engine = triage_engine(store.clone(), None);

    let step = engine
        .select_symptom(&user(), SymptomId(8))
        .await
        .expect("triage continues without a case");
    assert_eq!(step.context.case_id, None);
    assert_eq!(step.state(), &TriageState::QuestionFever);
    assert!(!step.audit.is_recorded());

    let step = engine
        .answer(&step.context, TriageAnswer::MusclePain { yes: true })
        .await
        .expect("answer still routes");
    assert!(step.state().is_terminal());
    assert!(!step.audit.is_recorded());
    assert!(store.updates().is_empty());
}

#[tokio::test]
async fn given_terminal_or_mismatched_step_when_answering_then_rejected() {
    let store = Arc::new(RecordingStore::default());
    let engine = triage_engine(store, None);

    let step = engine
        .select_symptom(&user(), SymptomId(3))
        .await
        .expect("fatigue from diarrhea should be known");
    let err = engine
        .answer(&step.context, TriageAnswer::Pregnant { yes: false })
        .await
        .expect_err("recommended is terminal");
    assert_eq!(err.kind, TriageErrorKind::CaseClosed);

    let step = engine
        .select_symptom(&user(), SymptomId(1))
        .await
        .expect("headache should be known");
    let err = engine
        .answer(&step.context, TriageAnswer::Pregnant { yes: false })
        .await
        .expect_err("pregnancy is not the pending question");
    assert_eq!(err.kind, TriageErrorKind::UnexpectedAnswer);
}
