#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use medikiosk::{
    case::DispenseStatus,
    kiosk::Kiosk,
    protocol::parse_client_message,
    server::handle_message,
};
use serde_json::{Value, json};

use support::{RecordingStore, ScriptedGateway, kiosk, ors};

struct Harness {
    store: Arc<RecordingStore>,
    gateway: Arc<ScriptedGateway>,
    kiosk: Kiosk,
}

fn harness() -> Harness {
    let store = Arc::new(RecordingStore::with_stock(&[(ors(), 5)]));
    let gateway = Arc::new(ScriptedGateway::default());
    Harness {
        kiosk: kiosk(store.clone(), gateway.clone()),
        store,
        gateway,
    }
}

async fn send(kiosk: &Kiosk, request: Value) -> Value {
    let message = parse_client_message(&request.to_string()).expect("request should parse");
    handle_message(kiosk, message).await
}

fn select(session: &str, symptom: Value) -> Value {
    json!({
        "type": "select_symptom",
        "session_id": session,
        "user_id": "user-7",
        "symptom_id": symptom,
    })
}

fn answer(session: &str, question: &str, extra: Value) -> Value {
    let mut request = json!({ "type": "answer", "session_id": session, "question": question });
    if let (Some(map), Value::Object(extra)) = (request.as_object_mut(), extra) {
        map.extend(extra);
    }
    request
}

#[tokio::test]
async fn given_headache_session_when_walked_through_socket_messages_then_medicine_is_offered() {
    let h = harness();

    let reply = send(&h.kiosk, select("s1", json!("1"))).await;
    assert_eq!(reply["ok"], json!(true));
    assert_eq!(reply["state"], json!("question_has_fever"));
    assert_eq!(reply["question"], json!("has_fever"));

    let reply = send(&h.kiosk, answer("s1", "has_fever", json!({ "yes": false }))).await;
    assert_eq!(reply["question"], json!("severity"));

    let reply = send(
        &h.kiosk,
        answer("s1", "severity", json!({ "level": 2, "note": "dull" })),
    )
    .await;
    assert_eq!(reply["question"], json!("pregnant"));

    let reply = send(&h.kiosk, answer("s1", "pregnant", json!({ "yes": false }))).await;
    assert_eq!(reply["question"], json!("paracetamol_allergy"));

    let reply = send(
        &h.kiosk,
        answer("s1", "paracetamol_allergy", json!({ "yes": false })),
    )
    .await;
    assert_eq!(reply["state"], json!("recommended"));
    assert_eq!(reply["terminal"], json!(true));
    assert_eq!(reply["medicine"]["id"], json!("paracetamol-500mg"));
    assert_eq!(reply["medicine"]["slot"], json!(1));
    assert_eq!(reply["medicine"]["audio_cue"], json!("paracetamol.mp3"));
    assert_eq!(reply["audit"]["recorded"], json!(true));
}

#[tokio::test]
async fn given_invalid_severity_when_answered_then_session_stays_on_the_question() {
    let h = harness();
    send(&h.kiosk, select("s1", json!(5))).await;

    for level in [json!(11), json!(-1), json!(3.5), json!("high"), Value::Null] {
        let reply = send(&h.kiosk, answer("s1", "severity", json!({ "level": level }))).await;
        assert_eq!(reply["ok"], json!(false), "level {level} must be rejected");
        assert_eq!(reply["error"]["code"], json!("validation"));
    }

    let reply = send(&h.kiosk, answer("s1", "severity", json!({ "level": "7" }))).await;
    assert_eq!(reply["state"], json!("refer_doctor"));
    assert_eq!(reply["referral"]["reason"], json!("severity_threshold"));
}

#[tokio::test]
async fn given_bad_symptom_selection_when_sent_then_validation_codes_are_returned() {
    let h = harness();

    let reply = send(
        &h.kiosk,
        json!({ "type": "select_symptom", "session_id": "s1", "user_id": "u" }),
    )
    .await;
    assert_eq!(reply["error"]["code"], json!("invalid_symptom"));

    let reply = send(&h.kiosk, select("s1", json!(42))).await;
    assert_eq!(reply["error"]["code"], json!("unknown_symptom"));
    assert_eq!(h.kiosk.active_sessions().await, 0);
}

#[tokio::test]
async fn given_accepted_recommendation_when_accepting_twice_then_one_command_is_sent() {
    let h = harness();
    send(&h.kiosk, select("s1", json!(3))).await;

    let first = send(&h.kiosk, json!({ "type": "accept", "session_id": "s1" })).await;
    let second = send(&h.kiosk, json!({ "type": "accept", "session_id": "s1" })).await;

    assert_eq!(first["state"], json!("dispensing"));
    assert_eq!(first["request_id"], second["request_id"]);
    assert_eq!(first["retries_left"], json!(2));
    assert_eq!(h.gateway.dispensed().len(), 1);

    h.gateway.push_status(false);
    let reply = send(&h.kiosk, json!({ "type": "poll", "session_id": "s1" })).await;
    assert_eq!(reply["state"], json!("success"));
    assert_eq!(h.store.stock(&ors()).await, Some(4));
}

#[tokio::test]
async fn given_recommendation_when_declined_then_session_can_say_goodbye() {
    let h = harness();
    let reply = send(&h.kiosk, select("s1", json!(3))).await;
    let case_id = reply["case_id"].as_u64().expect("case id");

    let reply = send(&h.kiosk, json!({ "type": "decline", "session_id": "s1" })).await;
    assert_eq!(reply["ok"], json!(true));
    assert!(h.gateway.dispensed().is_empty());
    let record = h
        .store
        .record(medikiosk::case::CaseId(case_id))
        .await;
    assert_eq!(record.dispense_status, DispenseStatus::Cancel);

    let reply = send(&h.kiosk, json!({ "type": "goodbye", "session_id": "s1" })).await;
    assert_eq!(reply["closed"], json!(true));
    let reply = send(&h.kiosk, json!({ "type": "poll", "session_id": "s1" })).await;
    assert_eq!(reply["error"]["code"], json!("unknown_session"));
}

#[tokio::test]
async fn given_referral_when_accepting_then_invalid_step() {
    let h = harness();
    send(&h.kiosk, select("s1", json!(2))).await;
    let reply = send(&h.kiosk, answer("s1", "has_fever", json!({ "yes": true }))).await;
    assert_eq!(reply["state"], json!("refer_doctor"));
    assert!(
        reply["referral"]["advice"]
            .as_str()
            .is_some_and(|advice| advice.contains("influenza"))
    );

    let reply = send(&h.kiosk, json!({ "type": "accept", "session_id": "s1" })).await;
    assert_eq!(reply["error"]["code"], json!("invalid_step"));
    let reply = send(&h.kiosk, json!({ "type": "retry", "session_id": "s1" })).await;
    assert_eq!(reply["error"]["code"], json!("invalid_step"));
}

#[tokio::test]
async fn given_new_symptom_when_session_is_active_then_current_case_is_replaced() {
    let h = harness();
    let first = send(&h.kiosk, select("s1", json!(1))).await;
    let second = send(&h.kiosk, select("s1", json!(3))).await;

    assert_ne!(first["case_id"], second["case_id"]);
    assert_eq!(h.kiosk.active_sessions().await, 1);
    let reply = send(&h.kiosk, answer("s1", "has_fever", json!({ "yes": false }))).await;
    assert_eq!(reply["error"]["code"], json!("case_closed"));
}

#[tokio::test]
async fn given_device_callback_when_sent_over_protocol_then_outcome_is_reported() {
    let h = harness();
    let reply = send(&h.kiosk, select("s1", json!(3))).await;
    let case_id = reply["case_id"].clone();
    send(&h.kiosk, json!({ "type": "accept", "session_id": "s1" })).await;

    let reply = send(
        &h.kiosk,
        json!({ "type": "dispense_complete", "request_id": format!("case-{case_id}") }),
    )
    .await;
    assert_eq!(reply["outcome"], json!("recorded"));
    let reply = send(
        &h.kiosk,
        json!({ "type": "dispense_complete", "case_id": case_id }),
    )
    .await;
    assert_eq!(reply["outcome"], json!("duplicate"));

    let reply = send(&h.kiosk, json!({ "type": "poll", "session_id": "s1" })).await;
    assert_eq!(reply["state"], json!("success"));
    assert_eq!(h.store.stock(&ors()).await, Some(4));
}

#[tokio::test]
async fn given_staff_commands_when_sent_then_slots_are_validated() {
    let h = harness();

    let reply = send(&h.kiosk, json!({ "type": "manual_dispense", "slot": 2 })).await;
    assert_eq!(reply["ok"], json!(true));
    assert_eq!(reply["device"]["acknowledged"], json!(true));

    for slot in [0, 9, 300, -1] {
        let reply = send(&h.kiosk, json!({ "type": "manual_dispense", "slot": slot })).await;
        assert_eq!(reply["error"]["code"], json!("invalid_slot"), "slot {slot}");
    }
    assert_eq!(h.gateway.dispensed().len(), 1);

    h.gateway.push_status(true);
    let reply = send(&h.kiosk, json!({ "type": "device_status" })).await;
    assert_eq!(reply["device"]["busy"], json!(true));
}

#[tokio::test]
async fn given_symptom_listing_when_requested_then_catalog_is_returned() {
    let h = harness();
    let reply = send(&h.kiosk, json!({ "type": "list_symptoms" })).await;
    let symptoms = reply["symptoms"].as_array().expect("symptom list");
    assert_eq!(symptoms.len(), 7);
    assert_eq!(symptoms[0]["name"], json!("Headache"));
}
