//! Core domain types for the clinic scheduling system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Surrogate identifiers for every entity kind
//! - Externally-owned records (patients, doctors, departments, rooms)
//! - Fixed-point money
//! - Appointments and their lifecycle status

use crate::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Notes must stay strictly shorter than this many characters.
pub const NOTES_LIMIT: usize = 1000;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! surrogate_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

surrogate_id!(
    /// Engine-assigned appointment identity
    AppointmentId
);
surrogate_id!(PatientId);
surrogate_id!(DoctorId);
surrogate_id!(RoomId);
surrogate_id!(DepartmentId);

/// Kind of externally-owned entity an appointment can reference
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Patient,
    Doctor,
    Room,
    Department,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Patient => "Patient",
            EntityKind::Doctor => "Doctor",
            EntityKind::Room => "Room",
            EntityKind::Department => "Department",
        };
        f.write_str(name)
    }
}

// ============================================================================
// External Entities
// ============================================================================

/// Medical specialty shared by doctors and departments
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Specialty {
    Cardiology,
    Neurology,
    Pediatrics,
    Traumatology,
    Gynecology,
    Urology,
    Ophthalmology,
    Dermatology,
    Psychiatry,
    GeneralMedicine,
    GeneralSurgery,
    Anesthesiology,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Patient {
    pub id: PatientId,
    /// National identity number, the patient's natural key
    pub dni: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Doctor {
    pub id: DoctorId,
    /// National identity number, the doctor's natural key
    pub dni: String,
    pub first_name: String,
    pub last_name: String,
    pub specialty: Specialty,
    #[serde(default)]
    pub license: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub specialty: Specialty,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    /// Room number, the room's natural key
    pub number: String,
    #[serde(default)]
    pub kind: String,
    pub department_id: DepartmentId,
}

// ============================================================================
// Money
// ============================================================================

/// Fixed-point monetary amount stored as integer cents
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = String;

    /// Parses decimal amounts with at most two fractional digits
    /// (`150`, `150.5`, `150.00`, `-3.25`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || format!("invalid amount {:?}", s);

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((whole, frac)) if !frac.is_empty() => (whole, frac),
            Some(_) => return Err(invalid()),
            None => (digits, ""),
        };

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(frac) || frac.len() > 2 {
            return Err(invalid());
        }

        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac_cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse::<i64>().map_err(|_| invalid())?,
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .ok_or_else(invalid)?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

// ============================================================================
// Appointment
// ============================================================================

/// Lifecycle status of an appointment
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    /// Textual name used on disk
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::InProgress => "IN_PROGRESS",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::NoShow => "NO_SHOW",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// Whether the appointment still occupies its doctor and room slot.
    ///
    /// Completed appointments keep occupying their slot; only cancellations
    /// and no-shows free it.
    pub fn is_active(self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::UnknownStatus(s.to_string()))
    }
}

/// The fields of an appointment, before an identity has been assigned
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppointmentDraft {
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub room_id: RoomId,
    pub date_time: NaiveDateTime,
    pub cost: Money,
    pub status: AppointmentStatus,
    pub notes: String,
}

impl AppointmentDraft {
    /// Check the field invariants that hold regardless of time.
    pub fn validate(&self) -> Result<()> {
        if !self.cost.is_positive() {
            return Err(Error::NonPositiveCost(self.cost));
        }
        check_notes(&self.notes)
    }
}

/// A scheduled appointment
///
/// Fields are private: status and notes only change through the engine,
/// which routes status changes through the transition table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointment {
    id: AppointmentId,
    patient_id: PatientId,
    doctor_id: DoctorId,
    room_id: RoomId,
    date_time: NaiveDateTime,
    cost: Money,
    status: AppointmentStatus,
    notes: String,
}

impl Appointment {
    /// Build an appointment from validated fields.
    pub fn new(id: AppointmentId, draft: AppointmentDraft) -> Result<Self> {
        draft.validate()?;
        Ok(Self {
            id,
            patient_id: draft.patient_id,
            doctor_id: draft.doctor_id,
            room_id: draft.room_id,
            date_time: draft.date_time,
            cost: draft.cost,
            status: draft.status,
            notes: draft.notes,
        })
    }

    pub fn id(&self) -> AppointmentId {
        self.id
    }

    pub fn patient_id(&self) -> PatientId {
        self.patient_id
    }

    pub fn doctor_id(&self) -> DoctorId {
        self.doctor_id
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn date_time(&self) -> NaiveDateTime {
        self.date_time
    }

    pub fn cost(&self) -> Money {
        self.cost
    }

    pub fn status(&self) -> AppointmentStatus {
        self.status
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Re-check field invariants (used on records read back from storage).
    pub fn validate(&self) -> Result<()> {
        self.to_draft().validate()
    }

    pub fn to_draft(&self) -> AppointmentDraft {
        AppointmentDraft {
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            room_id: self.room_id,
            date_time: self.date_time,
            cost: self.cost,
            status: self.status,
            notes: self.notes.clone(),
        }
    }

    pub(crate) fn set_status(&mut self, status: AppointmentStatus) {
        self.status = status;
    }

    pub(crate) fn set_notes(&mut self, notes: String) -> Result<()> {
        check_notes(&notes)?;
        self.notes = notes;
        Ok(())
    }
}

fn check_notes(notes: &str) -> Result<()> {
    let len = notes.chars().count();
    if len >= NOTES_LIMIT {
        return Err(Error::NotesTooLong {
            len,
            limit: NOTES_LIMIT,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> AppointmentDraft {
        AppointmentDraft {
            patient_id: PatientId(1),
            doctor_id: DoctorId(1),
            room_id: RoomId(1),
            date_time: "2030-01-01T10:00:00".parse().unwrap(),
            cost: Money::from_cents(15000),
            status: AppointmentStatus::Scheduled,
            notes: String::new(),
        }
    }

    #[test]
    fn test_money_parse_and_display() {
        assert_eq!("150.00".parse::<Money>().unwrap(), Money::from_cents(15000));
        assert_eq!("150".parse::<Money>().unwrap(), Money::from_cents(15000));
        assert_eq!("0.5".parse::<Money>().unwrap(), Money::from_cents(50));
        assert_eq!("-3.25".parse::<Money>().unwrap(), Money::from_cents(-325));

        assert_eq!(Money::from_cents(15000).to_string(), "150.00");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
        assert_eq!(Money::from_cents(-325).to_string(), "-3.25");
    }

    #[test]
    fn test_money_rejects_garbage() {
        for input in ["", "abc", "1.234", "1.", ".5", "1,50", "--1", "1e3"] {
            assert!(input.parse::<Money>().is_err(), "accepted {:?}", input);
        }
    }

    #[test]
    fn test_status_names() {
        for status in AppointmentStatus::ALL {
            assert_eq!(status.as_str().parse::<AppointmentStatus>().unwrap(), status);
        }
        assert!(matches!(
            "PROGRAMADA".parse::<AppointmentStatus>(),
            Err(Error::UnknownStatus(name)) if name == "PROGRAMADA"
        ));
    }

    #[test]
    fn test_active_statuses() {
        assert!(AppointmentStatus::Scheduled.is_active());
        assert!(AppointmentStatus::InProgress.is_active());
        assert!(AppointmentStatus::Completed.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
        assert!(!AppointmentStatus::NoShow.is_active());
    }

    #[test]
    fn test_new_rejects_non_positive_cost() {
        let mut d = draft();
        d.cost = Money::ZERO;
        assert!(matches!(
            Appointment::new(AppointmentId(1), d),
            Err(Error::NonPositiveCost(_))
        ));
    }

    #[test]
    fn test_notes_limit() {
        let mut d = draft();
        d.notes = "x".repeat(NOTES_LIMIT - 1);
        let mut appointment = Appointment::new(AppointmentId(1), d).unwrap();

        let result = appointment.set_notes("x".repeat(NOTES_LIMIT));
        assert!(matches!(result, Err(Error::NotesTooLong { len: 1000, .. })));
        assert_eq!(appointment.notes().len(), NOTES_LIMIT - 1);
    }
}
