/*!
Tests for error types and their messages.
*/

use crate::error::{CaptureError, KeepsakeError, SlotFailure};
use std::error::Error;
use std::io;

#[test]
fn test_keepsake_error_display() {
    let error = KeepsakeError::validation("slot name must not be empty");
    assert_eq!(error.to_string(), "Validation error: slot name must not be empty");

    let error = KeepsakeError::malformed("unexpected end of input");
    assert_eq!(error.to_string(), "Malformed record: unexpected end of input");

    let error = KeepsakeError::invalid_participant("empty id");
    assert_eq!(error.to_string(), "Invalid participant: empty id");

    let error = KeepsakeError::worker("pool shut down");
    assert_eq!(error.to_string(), "Worker error: pool shut down");
}

#[test]
fn test_capture_failed_names_participant() {
    let error = KeepsakeError::CaptureFailed {
        slot: "save.dat".to_string(),
        participant: "player".to_string(),
        reason: CaptureError::new("state locked").to_string(),
    };
    let message = error.to_string();
    assert!(message.contains("save.dat"));
    assert!(message.contains("player"));
    assert!(message.contains("state locked"));
}

#[test]
fn test_load_failed_keeps_source() {
    let error = KeepsakeError::load_failed("f.dat", KeepsakeError::malformed("bad json"));
    assert!(error.to_string().contains("f.dat"));
    assert!(error.is_malformed());

    let source = error.source().expect("load failure has a source");
    assert_eq!(source.to_string(), "Malformed record: bad json");
}

#[test]
fn test_backend_error_chain() {
    let root_cause = io::Error::new(io::ErrorKind::PermissionDenied, "Access denied");
    let error = KeepsakeError::backend("save.dat", root_cause);

    match &error {
        KeepsakeError::BackendUnavailable { slot, source } => {
            assert_eq!(slot, "save.dat");
            assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
        }
        _ => panic!("Expected BackendUnavailable error"),
    }
    assert!(error.source().is_some());
    assert!(!error.is_malformed());
}

#[test]
fn test_keepsake_error_from_io_error() {
    let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
    let error = KeepsakeError::from(io_error);
    assert!(matches!(error, KeepsakeError::Io(_)));
}

#[test]
fn test_keepsake_error_from_json_error() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error = KeepsakeError::from(json_error);
    assert!(matches!(error, KeepsakeError::Json(_)));
    assert!(error.is_malformed());
}

#[test]
fn test_slot_failures_message() {
    let error = KeepsakeError::SlotFailures(vec![
        SlotFailure {
            slot: "a.dat".to_string(),
            error: KeepsakeError::malformed("truncated"),
        },
        SlotFailure {
            slot: "b.dat".to_string(),
            error: KeepsakeError::worker("panicked"),
        },
    ]);
    let message = error.to_string();
    assert!(message.starts_with("2 slot(s) failed"));
    assert!(message.contains("a.dat: Malformed record: truncated"));
    assert!(message.contains("; b.dat: Worker error: panicked"));
}

#[test]
fn test_error_is_send_and_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    assert_send::<KeepsakeError>();
    assert_sync::<KeepsakeError>();
}

#[test]
fn test_error_result_type() {
    fn returns_error() -> crate::Result<()> {
        Err(KeepsakeError::validation("test error"))
    }

    assert!(returns_error().is_err());
}
