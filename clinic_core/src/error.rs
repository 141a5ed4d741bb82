//! Error types for the clinic_core library.

use crate::transition::Action;
use crate::types::{AppointmentId, AppointmentStatus, EntityKind, Money, Specialty};
use chrono::NaiveDateTime;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for clinic_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Entity registry validation error
    #[error("Registry error: {0}")]
    Registry(String),

    /// Internal state error (poisoned lock, corrupted index)
    #[error("State error: {0}")]
    State(String),

    #[error("Cannot schedule in the past: {requested} is before {now}")]
    PastDateTime {
        requested: NaiveDateTime,
        now: NaiveDateTime,
    },

    #[error("Cost must be greater than zero, got {0}")]
    NonPositiveCost(Money),

    #[error("Doctor {doctor} is not available at {at}")]
    DoctorUnavailable { doctor: String, at: NaiveDateTime },

    #[error("Room {room} is not available at {at}")]
    RoomUnavailable { room: String, at: NaiveDateTime },

    #[error("Doctor specialty {doctor:?} does not match room department specialty {room:?}")]
    SpecialtyMismatch { doctor: Specialty, room: Specialty },

    #[error("Appointment {0} not found")]
    AppointmentNotFound(AppointmentId),

    /// The transition table has no edge for this (state, action) pair
    #[error("Cannot {action} an appointment in state {from}")]
    InvalidTransition {
        from: AppointmentStatus,
        action: Action,
    },

    #[error("Invalid action: {0:?} (expected advance, cancel or no_show)")]
    InvalidAction(String),

    #[error("Notes must be shorter than {limit} characters, got {len}")]
    NotesTooLong { len: usize, limit: usize },

    #[error("Malformed CSV row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("{kind} not found: {key}")]
    ReferenceNotFound { kind: EntityKind, key: String },

    #[error("Unknown appointment status: {0:?}")]
    UnknownStatus(String),

    /// The repository rejected a write; in-memory state was left untouched
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[source] Box<Error>),
}

impl Error {
    pub(crate) fn persistence(err: Error) -> Self {
        Error::PersistenceFailure(Box::new(err))
    }
}
