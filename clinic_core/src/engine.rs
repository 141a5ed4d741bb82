//! Appointment scheduling engine.
//!
//! The engine owns the canonical appointment set and three secondary
//! indices (by patient, by doctor, by room). The set, the indices and the
//! repository live behind a single `RwLock`, so every mutation updates all
//! of them as one unit and readers always copy out a consistent snapshot.
//!
//! Scheduling rules, checked in order (first failure wins):
//! 1. the requested time is not in the past
//! 2. the cost is positive
//! 3. the doctor has no active appointment within the buffer
//! 4. the room has no active appointment within the buffer
//! 5. the doctor's specialty matches the room's department
//!
//! Cancelled appointments leave the doctor and room indices so the slot can
//! be booked again, but stay in the canonical set and the patient index.

use crate::config::SchedulingConfig;
use crate::csv_codec;
use crate::repository::AppointmentRepository;
use crate::transition::{next_status, Action};
use crate::{
    Appointment, AppointmentDraft, AppointmentId, AppointmentStatus, DoctorId, Error, Money,
    PatientId, Registry, Result, RoomId,
};
use chrono::{Duration, Local, NaiveDateTime};
use std::collections::HashMap;
use std::hash::Hash;
use std::io::{Read, Write};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Source of "now" for the past-date rule
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Wall clock in local time
pub fn local_clock() -> Clock {
    Arc::new(|| Local::now().naive_local())
}

type Index<K> = HashMap<K, Vec<AppointmentId>>;

#[derive(Debug, Default)]
struct EngineState {
    appointments: Vec<Appointment>,
    positions: HashMap<AppointmentId, usize>,
    by_patient: Index<PatientId>,
    by_doctor: Index<DoctorId>,
    by_room: Index<RoomId>,
    next_id: u64,
}

impl EngineState {
    fn from_appointments(appointments: Vec<Appointment>, min_next_id: u64) -> Self {
        let mut state = EngineState {
            next_id: min_next_id.max(1),
            ..Default::default()
        };
        for appointment in appointments {
            state.next_id = state.next_id.max(appointment.id().0 + 1);
            state.insert(appointment);
        }
        state
    }

    fn get(&self, id: AppointmentId) -> Option<&Appointment> {
        self.positions.get(&id).map(|&idx| &self.appointments[idx])
    }

    fn insert(&mut self, appointment: Appointment) {
        let id = appointment.id();
        self.by_patient
            .entry(appointment.patient_id())
            .or_default()
            .push(id);
        if appointment.status() != AppointmentStatus::Cancelled {
            self.by_doctor
                .entry(appointment.doctor_id())
                .or_default()
                .push(id);
            self.by_room.entry(appointment.room_id()).or_default().push(id);
        }
        self.positions.insert(id, self.appointments.len());
        self.appointments.push(appointment);
    }

    /// Undo the `insert` of the most recently added appointment
    fn remove_last(&mut self, id: AppointmentId) {
        if self.appointments.last().map(Appointment::id) != Some(id) {
            return;
        }
        if let Some(appointment) = self.appointments.pop() {
            self.positions.remove(&id);
            remove_from_index(&mut self.by_patient, appointment.patient_id(), id);
            self.release_slot(&appointment);
        }
    }

    /// Store a new version of an existing appointment
    fn update(&mut self, appointment: Appointment) {
        let Some(&idx) = self.positions.get(&appointment.id()) else {
            return;
        };
        if appointment.status() == AppointmentStatus::Cancelled {
            self.release_slot(&appointment);
        }
        self.appointments[idx] = appointment;
    }

    fn release_slot(&mut self, appointment: &Appointment) {
        remove_from_index(&mut self.by_doctor, appointment.doctor_id(), appointment.id());
        remove_from_index(&mut self.by_room, appointment.room_id(), appointment.id());
        tracing::debug!(
            "Released doctor {} / room {} slot held by appointment {}",
            appointment.doctor_id(),
            appointment.room_id(),
            appointment.id()
        );
    }

    fn collect(&self, ids: Option<&Vec<AppointmentId>>) -> Vec<Appointment> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.get(*id))
            .cloned()
            .collect()
    }

    /// First active appointment in `ids` closer than `buffer` to `at`
    fn conflict(
        &self,
        ids: Option<&Vec<AppointmentId>>,
        at: NaiveDateTime,
        buffer: Duration,
    ) -> Option<&Appointment> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.get(*id))
            .find(|a| {
                let gap = a.date_time() - at;
                a.status().is_active() && gap < buffer && gap > -buffer
            })
    }
}

fn remove_from_index<K: Eq + Hash>(index: &mut Index<K>, key: K, id: AppointmentId) {
    if let Some(ids) = index.get_mut(&key) {
        ids.retain(|existing| *existing != id);
        if ids.is_empty() {
            index.remove(&key);
        }
    }
}

struct Inner<R> {
    state: EngineState,
    repository: R,
}

/// Shared, thread-safe appointment scheduler
pub struct SchedulingEngine<R> {
    registry: Registry,
    buffer: Duration,
    clock: Clock,
    inner: RwLock<Inner<R>>,
}

impl<R: AppointmentRepository> SchedulingEngine<R> {
    /// Create an empty engine
    pub fn new(registry: Registry, repository: R, config: &SchedulingConfig) -> Self {
        Self {
            registry,
            buffer: config.buffer(),
            clock: local_clock(),
            inner: RwLock::new(Inner {
                state: EngineState::from_appointments(Vec::new(), 1),
                repository,
            }),
        }
    }

    /// Rebuild an engine from everything the repository holds.
    ///
    /// Every stored appointment must pass field validation and reference
    /// entities known to `registry`.
    pub fn restore(registry: Registry, repository: R, config: &SchedulingConfig) -> Result<Self> {
        let appointments = repository.load_all()?;
        for appointment in &appointments {
            appointment.validate()?;
            registry.require_patient(appointment.patient_id())?;
            registry.require_doctor(appointment.doctor_id())?;
            registry.require_room(appointment.room_id())?;
        }

        let count = appointments.len();
        let engine = Self::new(registry, repository, config);
        engine.write().state = EngineState::from_appointments(appointments, 1);

        tracing::info!("Restored {} appointments from repository", count);
        Ok(engine)
    }

    /// Replace the clock used for the past-date rule
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<R>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<R>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Book a new appointment and persist it.
    ///
    /// If the repository rejects the write, the in-memory insertion is
    /// rolled back and `PersistenceFailure` is returned.
    pub fn schedule(
        &self,
        patient: PatientId,
        doctor: DoctorId,
        room: RoomId,
        date_time: NaiveDateTime,
        cost: Money,
    ) -> Result<Appointment> {
        self.registry.require_patient(patient)?;
        let doctor_record = self.registry.require_doctor(doctor)?;
        let room_record = self.registry.require_room(room)?;

        let now = (self.clock)();
        if date_time < now {
            return Err(Error::PastDateTime {
                requested: date_time,
                now,
            });
        }
        if !cost.is_positive() {
            return Err(Error::NonPositiveCost(cost));
        }

        let mut guard = self.write();
        let Inner { state, repository } = &mut *guard;

        if let Some(existing) = state.conflict(state.by_doctor.get(&doctor), date_time, self.buffer) {
            tracing::warn!(
                "Doctor {} already booked at {} (appointment {})",
                doctor_record.dni,
                existing.date_time(),
                existing.id()
            );
            return Err(Error::DoctorUnavailable {
                doctor: doctor_record.dni.clone(),
                at: date_time,
            });
        }
        if let Some(existing) = state.conflict(state.by_room.get(&room), date_time, self.buffer) {
            tracing::warn!(
                "Room {} already booked at {} (appointment {})",
                room_record.number,
                existing.date_time(),
                existing.id()
            );
            return Err(Error::RoomUnavailable {
                room: room_record.number.clone(),
                at: date_time,
            });
        }

        let room_specialty = self.registry.room_specialty(room_record)?;
        if doctor_record.specialty != room_specialty {
            return Err(Error::SpecialtyMismatch {
                doctor: doctor_record.specialty,
                room: room_specialty,
            });
        }

        let id = AppointmentId(state.next_id);
        let appointment = Appointment::new(
            id,
            AppointmentDraft {
                patient_id: patient,
                doctor_id: doctor,
                room_id: room,
                date_time,
                cost,
                status: AppointmentStatus::Scheduled,
                notes: String::new(),
            },
        )?;

        state.insert(appointment.clone());
        state.next_id += 1;

        if let Err(e) = repository.persist(&appointment) {
            state.remove_last(id);
            state.next_id -= 1;
            tracing::warn!("Rolled back appointment {}: {}", id, e);
            return Err(Error::persistence(e));
        }

        tracing::info!(
            "Scheduled appointment {} for patient {} with doctor {} in room {} at {}",
            id,
            patient,
            doctor_record.dni,
            room_record.number,
            date_time
        );
        Ok(appointment)
    }

    /// Cancel a scheduled appointment, recording `reason` in its notes.
    ///
    /// Only `Scheduled` appointments can be cancelled. A blank reason
    /// leaves the notes untouched.
    pub fn cancel(&self, id: AppointmentId, reason: &str) -> Result<Appointment> {
        let mut guard = self.write();
        let Inner { state, repository } = &mut *guard;

        let current = state.get(id).ok_or(Error::AppointmentNotFound(id))?;
        let status = next_status(current.status(), Action::Cancel).map_err(|e| {
            tracing::warn!("Rejected cancellation of appointment {}: {}", id, e);
            e
        })?;

        let mut updated = current.clone();
        if let Some(notes) = cancellation_notes(updated.notes(), reason) {
            updated.set_notes(notes)?;
        }
        updated.set_status(status);

        repository.merge(&updated).map_err(Error::persistence)?;
        state.update(updated.clone());

        tracing::info!("Cancelled appointment {}", id);
        Ok(updated)
    }

    /// Apply a lifecycle action through the transition table and persist.
    pub fn advance_status(&self, id: AppointmentId, action: Action) -> Result<Appointment> {
        let mut guard = self.write();
        let Inner { state, repository } = &mut *guard;

        let current = state.get(id).ok_or(Error::AppointmentNotFound(id))?;
        let from = current.status();
        let status = next_status(from, action).map_err(|e| {
            tracing::warn!("Rejected {} on appointment {}: {}", action, id, e);
            e
        })?;

        let mut updated = current.clone();
        updated.set_status(status);

        repository.merge(&updated).map_err(Error::persistence)?;
        state.update(updated.clone());

        tracing::info!("Appointment {}: {} -> {}", id, from, status);
        Ok(updated)
    }

    pub fn get(&self, id: AppointmentId) -> Option<Appointment> {
        self.read().state.get(id).cloned()
    }

    /// Snapshot of the canonical set, in creation order
    pub fn all(&self) -> Vec<Appointment> {
        self.read().state.appointments.clone()
    }

    pub fn len(&self) -> usize {
        self.read().state.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn query_by_patient(&self, patient: PatientId) -> Vec<Appointment> {
        let guard = self.read();
        guard.state.collect(guard.state.by_patient.get(&patient))
    }

    pub fn query_by_doctor(&self, doctor: DoctorId) -> Vec<Appointment> {
        let guard = self.read();
        guard.state.collect(guard.state.by_doctor.get(&doctor))
    }

    pub fn query_by_room(&self, room: RoomId) -> Vec<Appointment> {
        let guard = self.read();
        guard.state.collect(guard.state.by_room.get(&room))
    }

    pub fn is_doctor_available(&self, doctor: DoctorId, at: NaiveDateTime) -> bool {
        let guard = self.read();
        let state = &guard.state;
        state
            .conflict(state.by_doctor.get(&doctor), at, self.buffer)
            .is_none()
    }

    pub fn is_room_available(&self, room: RoomId, at: NaiveDateTime) -> bool {
        let guard = self.read();
        let state = &guard.state;
        state
            .conflict(state.by_room.get(&room), at, self.buffer)
            .is_none()
    }

    /// Run `f` against the repository while holding the engine read lock
    pub fn with_repository<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&self.read().repository)
    }

    /// Write the canonical set as CSV. Returns the number of rows written.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let snapshot = self.all();
        let count = csv_codec::encode(&snapshot, &self.registry, writer)?;
        tracing::info!("Exported {} appointments", count);
        Ok(count)
    }

    /// Replace every appointment with the contents of a CSV export.
    ///
    /// Nothing changes unless every row decodes and resolves and the
    /// repository accepts the new set.
    pub fn import_csv<Rd: Read>(&self, reader: Rd) -> Result<usize> {
        let drafts = csv_codec::decode(reader, &self.registry).map_err(|e| {
            tracing::warn!("CSV import rejected: {}", e);
            e
        })?;
        self.replace_all(drafts)
    }

    /// Swap the canonical set and indices for a new set of appointments.
    ///
    /// Imported appointments receive fresh ids following the current
    /// allocator position. Conflict rules are not re-checked.
    pub fn replace_all(&self, drafts: Vec<AppointmentDraft>) -> Result<usize> {
        let mut guard = self.write();
        let Inner { state, repository } = &mut *guard;

        let first_id = state.next_id;
        let appointments = drafts
            .into_iter()
            .zip(first_id..)
            .map(|(draft, id)| Appointment::new(AppointmentId(id), draft))
            .collect::<Result<Vec<_>>>()?;

        let count = appointments.len();
        let replacement = EngineState::from_appointments(appointments, first_id);

        repository
            .replace_all(&replacement.appointments)
            .map_err(Error::persistence)?;
        *state = replacement;

        tracing::info!("Imported {} appointments", count);
        Ok(count)
    }

    /// Check that the canonical set and the indices agree.
    pub fn verify_indices(&self) -> Result<()> {
        let guard = self.read();
        let state = &guard.state;
        let corrupt = |msg: String| -> Result<()> { Err(Error::State(msg)) };

        if state.positions.len() != state.appointments.len() {
            return corrupt("position map and canonical set differ in size".into());
        }

        for (idx, appointment) in state.appointments.iter().enumerate() {
            let id = appointment.id();
            if state.positions.get(&id) != Some(&idx) {
                return corrupt(format!("appointment {} has a stale position", id));
            }

            let occurrences = |ids: Option<&Vec<AppointmentId>>| {
                ids.map_or(0, |ids| ids.iter().filter(|x| **x == id).count())
            };
            let slot_expected = usize::from(appointment.status() != AppointmentStatus::Cancelled);

            if occurrences(state.by_patient.get(&appointment.patient_id())) != 1 {
                return corrupt(format!("appointment {} missing from patient index", id));
            }
            if occurrences(state.by_doctor.get(&appointment.doctor_id())) != slot_expected {
                return corrupt(format!("appointment {} misindexed by doctor", id));
            }
            if occurrences(state.by_room.get(&appointment.room_id())) != slot_expected {
                return corrupt(format!("appointment {} misindexed by room", id));
            }
        }

        let indexed = state
            .by_patient
            .values()
            .chain(state.by_doctor.values())
            .chain(state.by_room.values())
            .flatten();
        for id in indexed {
            if !state.positions.contains_key(id) {
                return corrupt(format!("index entry {} has no appointment", id));
            }
        }

        Ok(())
    }
}

fn cancellation_notes(existing: &str, reason: &str) -> Option<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return None;
    }
    if existing.is_empty() {
        Some(format!("Cancellation: {}", reason))
    } else {
        Some(format!("{} | Cancellation: {}", existing, reason))
    }
}
