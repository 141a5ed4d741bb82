//! Integration tests for the clinic binary.
//!
//! These tests verify end-to-end behavior including:
//! - Scheduling with conflict and specialty checks
//! - Status lifecycle commands
//! - CSV export and all-or-nothing import
//! - Persistence across invocations

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const REGISTRY: &str = r#"{
    "departments": [
        {"id": 1, "name": "Cardiology", "specialty": "CARDIOLOGY"},
        {"id": 2, "name": "Neurology", "specialty": "NEUROLOGY"}
    ],
    "rooms": [
        {"id": 1, "number": "R-1", "kind": "consulting", "department_id": 1},
        {"id": 2, "number": "N-1", "kind": "consulting", "department_id": 2}
    ],
    "doctors": [
        {"id": 1, "dni": "12345678", "first_name": "Ana", "last_name": "Lopez", "specialty": "CARDIOLOGY"},
        {"id": 2, "dni": "87654321", "first_name": "Luis", "last_name": "Gomez", "specialty": "NEUROLOGY"}
    ],
    "patients": [
        {"id": 1, "dni": "99999999", "first_name": "Maria", "last_name": "Perez"},
        {"id": 2, "dni": "11111111", "first_name": "Jorge", "last_name": "Diaz"}
    ]
}"#;

/// Helper to create a data directory holding the sample registry
fn setup_test_dir() -> TempDir {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("registry.json"), REGISTRY).expect("Failed to write registry");
    temp_dir
}

/// Helper to get the path to the CLI binary
fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("clinic"))
}

fn schedule(data_dir: &Path, patient: &str, doctor: &str, room: &str, at: &str) -> Command {
    let mut cmd = cli();
    cmd.arg("--data-dir")
        .arg(data_dir)
        .arg("schedule")
        .args(["--patient", patient])
        .args(["--doctor", doctor])
        .args(["--room", room])
        .args(["--at", at])
        .args(["--cost", "150.00"]);
    cmd
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Clinic appointment scheduling system",
        ));
}

#[test]
fn test_missing_registry_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    cli()
        .arg("--data-dir")
        .arg(temp_dir.path())
        .args(["list", "--all"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No entity registry"));
}

#[test]
fn test_schedule_logs_to_journal() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    schedule(data_dir, "99999999", "12345678", "R-1", "2031-03-01T10:00:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("Scheduled appointment 1"));

    let journal = fs::read_to_string(data_dir.join("appointments.wal")).unwrap();
    assert_eq!(journal.lines().count(), 1);
    assert!(journal.contains("SCHEDULED"));
}

#[test]
fn test_doctor_conflict_rejected() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    schedule(data_dir, "99999999", "12345678", "R-1", "2031-03-01T10:00:00")
        .assert()
        .success();

    schedule(data_dir, "11111111", "12345678", "R-1", "2031-03-01T11:00:00")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DoctorUnavailable"));

    schedule(data_dir, "11111111", "12345678", "R-1", "2031-03-01T13:00:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("Scheduled appointment 2"));
}

#[test]
fn test_specialty_mismatch_rejected() {
    let temp_dir = setup_test_dir();

    schedule(temp_dir.path(), "99999999", "87654321", "R-1", "2031-03-01T10:00:00")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SpecialtyMismatch"));
}

#[test]
fn test_past_date_rejected() {
    let temp_dir = setup_test_dir();

    schedule(temp_dir.path(), "99999999", "12345678", "R-1", "2001-01-01T10:00:00")
        .assert()
        .failure()
        .stderr(predicate::str::contains("PastDateTime"));
}

#[test]
fn test_cancel_frees_slot() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    schedule(data_dir, "99999999", "12345678", "R-1", "2031-03-01T10:00:00")
        .assert()
        .success();

    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .args(["cancel", "1", "--reason", "patient travelling"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cancellation: patient travelling"));

    // Slot is free again, and the cancelled appointment is still listed
    schedule(data_dir, "11111111", "12345678", "R-1", "2031-03-01T10:00:00")
        .assert()
        .success();

    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .args(["list", "--patient", "99999999"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CANCELLED"));

    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .args(["list", "--doctor", "12345678"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CANCELLED").not())
        .stdout(predicate::str::contains("11111111"));
}

#[test]
fn test_lifecycle_commands() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    schedule(data_dir, "99999999", "12345678", "R-1", "2031-03-01T10:00:00")
        .assert()
        .success();

    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .args(["advance", "1", "advance"])
        .assert()
        .success()
        .stdout(predicate::str::contains("now IN_PROGRESS"));

    // In-progress appointments cannot be cancelled
    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .args(["cancel", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("InvalidTransition"));

    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .args(["advance", "1", "advance"])
        .assert()
        .success()
        .stdout(predicate::str::contains("now COMPLETED"));

    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .args(["advance", "1", "no_show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("InvalidTransition"));
}

#[test]
fn test_list_shows_allowed_actions() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    schedule(data_dir, "99999999", "12345678", "R-1", "2031-03-01T10:00:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("actions: advance, cancel, no_show"));

    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .args(["advance", "1", "no_show"])
        .assert()
        .success();

    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .args(["list", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NO_SHOW"))
        .stdout(predicate::str::contains("actions:").not());
}

#[test]
fn test_headerless_import_rejected() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    let csv_path = data_dir.join("rows.csv");
    fs::write(
        &csv_path,
        "11111111,12345678,R-1,2031-04-01T10:00:00,90.00,SCHEDULED,ok\n",
    )
    .unwrap();

    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .arg("import")
        .arg(&csv_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("MalformedRow"));
}

#[test]
fn test_invalid_action() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    schedule(data_dir, "99999999", "12345678", "R-1", "2031-03-01T10:00:00")
        .assert()
        .success();

    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .args(["advance", "1", "reschedule"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("InvalidAction"));
}

#[test]
fn test_unknown_appointment() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("--data-dir")
        .arg(temp_dir.path())
        .args(["cancel", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("AppointmentNotFound"));
}

#[test]
fn test_export_then_import_elsewhere() {
    let source = setup_test_dir();
    let target = setup_test_dir();
    let csv_path = source.path().join("export").join("appointments.csv");

    schedule(source.path(), "99999999", "12345678", "R-1", "2031-03-01T10:00:00")
        .assert()
        .success();
    cli()
        .arg("--data-dir")
        .arg(source.path())
        .args(["cancel", "1", "--reason", "sick, will call back"])
        .assert()
        .success();
    schedule(source.path(), "11111111", "87654321", "N-1", "2031-03-02T09:30:00")
        .assert()
        .success();

    cli()
        .arg("--data-dir")
        .arg(source.path())
        .arg("export")
        .arg(&csv_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 2 appointments"));

    let csv = fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "patientKey,doctorKey,roomKey,dateTimeISO8601,cost,status,notes"
    );
    assert_eq!(
        lines[1],
        "99999999,12345678,R-1,2031-03-01T10:00:00,150.00,CANCELLED,Cancellation: sick; will call back"
    );
    assert_eq!(lines.len(), 3);

    cli()
        .arg("--data-dir")
        .arg(target.path())
        .arg("import")
        .arg(&csv_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 appointments"));

    cli()
        .arg("--data-dir")
        .arg(target.path())
        .args(["list", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sick, will call back"))
        .stdout(predicate::str::contains("N-1"));
}

#[test]
fn test_export_to_stdout() {
    let temp_dir = setup_test_dir();

    schedule(temp_dir.path(), "99999999", "12345678", "R-1", "2031-03-01T10:00")
        .assert()
        .success();

    cli()
        .arg("--data-dir")
        .arg(temp_dir.path())
        .args(["export", "-"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "99999999,12345678,R-1,2031-03-01T10:00:00,150.00,SCHEDULED,",
        ));
}

#[test]
fn test_import_with_unknown_room_leaves_state() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    schedule(data_dir, "99999999", "12345678", "R-1", "2031-03-01T10:00:00")
        .assert()
        .success();
    let journal_before = fs::read_to_string(data_dir.join("appointments.wal")).unwrap();

    let csv_path = data_dir.join("bad.csv");
    fs::write(
        &csv_path,
        "patientKey,doctorKey,roomKey,dateTimeISO8601,cost,status,notes\n\
         11111111,12345678,R-1,2031-04-01T10:00:00,90.00,SCHEDULED,ok\n\
         11111111,12345678,Z-9,2031-05-01T10:00:00,90.00,SCHEDULED,bad\n",
    )
    .unwrap();

    cli()
        .arg("--data-dir")
        .arg(data_dir)
        .arg("import")
        .arg(&csv_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("ReferenceNotFound"))
        .stderr(predicate::str::contains("Z-9"));

    let journal_after = fs::read_to_string(data_dir.join("appointments.wal")).unwrap();
    assert_eq!(journal_before, journal_after);
}

#[test]
fn test_list_requires_a_filter() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("list")
        .assert()
        .failure();
}

#[test]
fn test_list_empty() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("--data-dir")
        .arg(temp_dir.path())
        .args(["list", "--room", "N-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No appointments found"));
}
