#![forbid(unsafe_code)]

//! Core domain model and scheduling logic for the clinic appointment system.
//!
//! This crate provides:
//! - Domain types (appointments, patients, doctors, rooms, money)
//! - Entity registry with natural-key lookup
//! - Status transition table
//! - Scheduling engine with conflict checks and secondary indices
//! - Referential CSV import/export
//! - Persistence (in-memory and JSONL journal repositories)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod registry;
pub mod transition;
pub mod repository;
pub mod csv_codec;
pub mod engine;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use registry::{EntityRef, Registry};
pub use transition::{next_status, Action};
pub use repository::{AppointmentRepository, JsonlRepository, MemoryRepository};
pub use engine::{Clock, SchedulingEngine};
