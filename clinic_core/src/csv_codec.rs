//! Referential CSV encoding of appointment sets.
//!
//! Rows reference patients, doctors and rooms by natural key:
//!
//! ```text
//! patientKey,doctorKey,roomKey,dateTimeISO8601,cost,status,notes
//! 99999999,12345678,R-1,2030-01-01T10:00:00,150.00,SCHEDULED,First visit; fasting
//! ```
//!
//! Fields are split on raw commas with no quoting. Commas inside notes are
//! written as semicolons and restored on decode, so notes that already
//! contained semicolons come back with commas. Line breaks inside notes are
//! written as spaces.

use crate::{
    Appointment, AppointmentDraft, AppointmentStatus, EntityKind, Error, Money, Registry, Result,
};
use chrono::NaiveDateTime;
use std::io::{Read, Write};

pub const HEADER: [&str; 7] = [
    "patientKey",
    "doctorKey",
    "roomKey",
    "dateTimeISO8601",
    "cost",
    "status",
    "notes",
];

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_TIME_MINUTES_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Write a header row and one row per appointment, in the given order.
///
/// Returns the number of data rows written.
pub fn encode<W: Write>(
    appointments: &[Appointment],
    registry: &Registry,
    writer: W,
) -> Result<usize> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(writer);

    writer.write_record(HEADER)?;
    for appointment in appointments {
        writer.write_record(encode_row(appointment, registry)?)?;
    }
    writer.flush()?;

    tracing::debug!("Encoded {} appointments to CSV", appointments.len());
    Ok(appointments.len())
}

fn encode_row(appointment: &Appointment, registry: &Registry) -> Result<[String; 7]> {
    let patient = registry.require_patient(appointment.patient_id())?;
    let doctor = registry.require_doctor(appointment.doctor_id())?;
    let room = registry.require_room(appointment.room_id())?;

    Ok([
        patient.dni.clone(),
        doctor.dni.clone(),
        room.number.clone(),
        format_date_time(appointment.date_time()),
        appointment.cost().to_string(),
        appointment.status().as_str().to_string(),
        escape_notes(appointment.notes()),
    ])
}

/// Parse every data row, resolving natural keys against `registry`.
///
/// The first row must be the header. Any failing row aborts the whole decode,
/// so callers either get every row or none.
pub fn decode<R: Read>(reader: R, registry: &Registry) -> Result<Vec<AppointmentDraft>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_reader(reader);

    let header = reader.headers()?;
    if !header.is_empty() && header.iter().map(str::trim).ne(HEADER) {
        return Err(Error::MalformedRow {
            line: 1,
            reason: format!(
                "expected header {:?}, found {:?}",
                HEADER.join(","),
                header.iter().collect::<Vec<_>>().join(",")
            ),
        });
    }

    let mut drafts = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        drafts.push(decode_row(&record, line, registry)?);
    }

    tracing::debug!("Decoded {} appointments from CSV", drafts.len());
    Ok(drafts)
}

fn decode_row(
    record: &csv::StringRecord,
    line: u64,
    registry: &Registry,
) -> Result<AppointmentDraft> {
    let malformed = |reason: String| Error::MalformedRow { line, reason };

    if record.len() != HEADER.len() {
        return Err(malformed(format!(
            "expected {} fields, found {}: {:?}",
            HEADER.len(),
            record.len(),
            record.iter().collect::<Vec<_>>().join(",")
        )));
    }

    let patient_key = &record[0];
    let doctor_key = &record[1];
    let room_key = &record[2];

    let patient = registry
        .patient_by_dni(patient_key)
        .ok_or_else(|| not_found(EntityKind::Patient, patient_key))?;
    let doctor = registry
        .doctor_by_dni(doctor_key)
        .ok_or_else(|| not_found(EntityKind::Doctor, doctor_key))?;
    let room = registry
        .room_by_number(room_key)
        .ok_or_else(|| not_found(EntityKind::Room, room_key))?;

    let date_time = parse_date_time(&record[3])
        .ok_or_else(|| malformed(format!("invalid date-time {:?}", &record[3])))?;
    let cost: Money = record[4].parse().map_err(malformed)?;
    let status: AppointmentStatus = record[5].parse()?;
    let notes = unescape_notes(&record[6]);

    let draft = AppointmentDraft {
        patient_id: patient.id,
        doctor_id: doctor.id,
        room_id: room.id,
        date_time,
        cost,
        status,
        notes,
    };
    draft.validate()?;
    Ok(draft)
}

fn not_found(kind: EntityKind, key: &str) -> Error {
    Error::ReferenceNotFound {
        kind,
        key: key.to_string(),
    }
}

pub fn format_date_time(date_time: NaiveDateTime) -> String {
    date_time.format(DATE_TIME_FORMAT).to_string()
}

/// Accepts seconds precision (with optional fraction) or minutes precision.
pub fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, DATE_TIME_MINUTES_FORMAT))
        .ok()
}

fn escape_notes(notes: &str) -> String {
    notes
        .chars()
        .map(|c| match c {
            ',' => ';',
            '\r' | '\n' => ' ',
            c => c,
        })
        .collect()
}

fn unescape_notes(notes: &str) -> String {
    notes.replace(';', ",")
}
