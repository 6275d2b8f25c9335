use std::{fs, io::ErrorKind, os::unix::fs::FileTypeExt, path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{UnixListener, UnixStream},
    signal::unix::{SignalKind, signal},
    sync::mpsc,
};

use crate::{
    kiosk::{Kiosk, KioskError},
    protocol::{
        ClientMessage, audit_response, command_response, dispense_response, error_response,
        kiosk_error_response, ok_response, parse_client_message, triage_response,
    },
};

enum ExitReason {
    SocketMessage,
    Signal(&'static str),
}

pub async fn run(socket_path: &Path, kiosk: Arc<Kiosk>) -> Result<()> {
    prepare_socket_path(socket_path)?;
    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("unable to bind socket {}", socket_path.display()))?;

    let mut sigint =
        signal(SignalKind::interrupt()).context("unable to listen for SIGINT (Ctrl+C)")?;
    let mut sigterm = signal(SignalKind::terminate()).context("unable to listen for SIGTERM")?;
    let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<()>();

    tracing::info!(
        target: "server",
        socket_path = %socket_path.display(),
        "server_listening"
    );

    let exit_reason = loop {
        tokio::select! {
            _ = sigint.recv() => break ExitReason::Signal("SIGINT"),
            _ = sigterm.recv() => break ExitReason::Signal("SIGTERM"),
            Some(()) = exit_rx.recv() => break ExitReason::SocketMessage,
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _)) => {
                        let kiosk = Arc::clone(&kiosk);
                        let sender = exit_tx.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_client(stream, kiosk, sender).await {
                                tracing::warn!(target: "server", error = %format!("{err:#}"), "client_failed");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::warn!(target: "server", error = %err, "accept_failed");
                    }
                }
            }
        }
    };

    cleanup_socket_path(socket_path)?;
    match exit_reason {
        ExitReason::SocketMessage => {
            tracing::info!(target: "server", reason = "exit_message", "server_stopped")
        }
        ExitReason::Signal(signal_name) => {
            tracing::info!(target: "server", reason = signal_name, "server_stopped")
        }
    }

    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    kiosk: Arc<Kiosk>,
    exit_tx: mpsc::UnboundedSender<()>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (response, exit) = match parse_client_message(line) {
            Ok(ClientMessage::Exit) => (json!({ "ok": true }), true),
            Ok(message) => (handle_message(&kiosk, message).await, false),
            Err(err) => {
                tracing::debug!(target: "server", error = %err, "invalid_message");
                (error_response("invalid_message", &err.to_string()), false)
            }
        };

        let mut payload = serde_json::to_vec(&response).context("unable to encode response")?;
        payload.push(b'\n');
        writer.write_all(&payload).await?;

        if exit {
            let _ = exit_tx.send(());
            break;
        }
    }

    Ok(())
}

/// Runs one request against the kiosk and renders the reply line.
pub async fn handle_message(kiosk: &Kiosk, message: ClientMessage) -> Value {
    let result: Result<Value, KioskError> = match message {
        ClientMessage::Exit => Ok(json!({ "ok": true })),
        ClientMessage::ListSymptoms => Ok(ok_response(json!({
            "symptoms": kiosk.list_symptoms(),
        }))),
        ClientMessage::SelectSymptom {
            session_id,
            user_id,
            symptom_id,
        } => kiosk
            .select_symptom(&session_id, &user_id, symptom_id.as_deref())
            .await
            .map(|step| triage_response(&step, kiosk.medicine_info(&step).as_ref())),
        ClientMessage::Answer { session_id, answer } => match answer.into_answer() {
            Ok(answer) => kiosk
                .answer(&session_id, answer)
                .await
                .map(|step| triage_response(&step, kiosk.medicine_info(&step).as_ref())),
            Err(err) => Err(KioskError::Triage(err)),
        },
        ClientMessage::Accept { session_id } => kiosk
            .accept(&session_id)
            .await
            .map(|step| dispense_response(&step)),
        ClientMessage::Decline { session_id } => kiosk
            .decline(&session_id)
            .await
            .map(|audit| audit_response(&audit)),
        ClientMessage::Poll { session_id } => kiosk
            .poll(&session_id)
            .await
            .map(|step| dispense_response(&step)),
        ClientMessage::Retry { session_id } => kiosk
            .retry(&session_id)
            .await
            .map(|step| dispense_response(&step)),
        ClientMessage::Cancel { session_id } => kiosk
            .cancel(&session_id)
            .await
            .map(|step| dispense_response(&step)),
        ClientMessage::Goodbye { session_id } => {
            let closed = kiosk.goodbye(&session_id).await;
            Ok(ok_response(json!({ "closed": closed })))
        }
        ClientMessage::DispenseComplete { reference } => kiosk
            .dispense_complete(reference)
            .await
            .map(|ack| ok_response(json!({ "case_id": ack.case_id, "outcome": ack.outcome }))),
        ClientMessage::ManualDispense { slot } => match u8::try_from(slot) {
            Ok(slot) => kiosk
                .manual_dispense(slot)
                .await
                .map(|(request_id, ack)| command_response(&request_id, &ack)),
            Err(_) => Err(KioskError::Dispense(crate::dispense::error::invalid_slot(
                format!("slot {slot} is out of range"),
            ))),
        },
        ClientMessage::DeviceStatus => kiosk
            .device_status()
            .await
            .map(|status| ok_response(json!({ "device": status }))),
    };

    result.unwrap_or_else(|err| {
        tracing::debug!(target: "server", code = %err.code(), error = %err, "request_rejected");
        kiosk_error_response(&err)
    })
}

fn prepare_socket_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("unable to create {}", parent.display()))?;
    }

    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.file_type().is_socket() || metadata.is_file() {
                fs::remove_file(path)
                    .with_context(|| format!("unable to remove stale socket {}", path.display()))?;
            } else {
                bail!(
                    "socket path exists but is not removable as file/socket: {}",
                    path.display()
                );
            }
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("unable to inspect {}", path.display()));
        }
    }

    Ok(())
}

fn cleanup_socket_path(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("unable to remove {}", path.display())),
    }
}
