//! Durable storage for appointments.
//!
//! The engine hands every created or updated appointment to an
//! [`AppointmentRepository`]. Two implementations ship here: an in-process
//! [`MemoryRepository`] and a JSON-lines journal ([`JsonlRepository`])
//! guarded by file locks for safe concurrent access.

use crate::{Appointment, AppointmentId, Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Appointment persistence contract consumed by the scheduling engine
pub trait AppointmentRepository {
    /// Store a new appointment. Fails if the id is already stored.
    fn persist(&mut self, appointment: &Appointment) -> Result<()>;

    /// Update an appointment that was previously persisted.
    fn merge(&mut self, appointment: &Appointment) -> Result<()>;

    fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>>;

    /// All stored appointments in the order they were first persisted
    fn load_all(&self) -> Result<Vec<Appointment>>;

    /// Replace the whole stored set in one step.
    fn replace_all(&mut self, appointments: &[Appointment]) -> Result<()>;
}

// ============================================================================
// In-memory repository
// ============================================================================

/// Repository kept in process memory.
///
/// A shared failure switch makes every write fail while it is on, which
/// lets callers exercise rollback paths.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: Vec<Appointment>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that toggles write failures, usable after the repository
    /// has been moved into an engine
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_writes)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "repository writes are disabled",
            )));
        }
        Ok(())
    }

    fn position(&self, id: AppointmentId) -> Option<usize> {
        self.records.iter().position(|a| a.id() == id)
    }
}

impl AppointmentRepository for MemoryRepository {
    fn persist(&mut self, appointment: &Appointment) -> Result<()> {
        self.check_writable()?;
        if self.position(appointment.id()).is_some() {
            return Err(Error::State(format!(
                "Appointment {} is already persisted",
                appointment.id()
            )));
        }
        self.records.push(appointment.clone());
        Ok(())
    }

    fn merge(&mut self, appointment: &Appointment) -> Result<()> {
        self.check_writable()?;
        let idx = self
            .position(appointment.id())
            .ok_or(Error::AppointmentNotFound(appointment.id()))?;
        self.records[idx] = appointment.clone();
        Ok(())
    }

    fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        Ok(self.position(id).map(|idx| self.records[idx].clone()))
    }

    fn load_all(&self) -> Result<Vec<Appointment>> {
        Ok(self.records.clone())
    }

    fn replace_all(&mut self, appointments: &[Appointment]) -> Result<()> {
        self.check_writable()?;
        self.records = appointments.to_vec();
        Ok(())
    }
}

// ============================================================================
// JSONL journal repository
// ============================================================================

/// A journal line as written
#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry<'a> {
    Persist { appointment: &'a Appointment },
    Merge { appointment: &'a Appointment },
}

/// A journal line as read back
#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalRecord {
    Persist { appointment: Appointment },
    Merge { appointment: Appointment },
}

/// Append-only JSONL journal with file locking.
///
/// `persist` and `merge` each append one line; reading replays the journal
/// with the last line for an id winning.
pub struct JsonlRepository {
    path: PathBuf,
}

impl JsonlRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append one entry while holding the exclusive lock.
    ///
    /// The stored-id check runs against the locked file, so a writer in
    /// another process cannot slip a record for the same id in between.
    fn append(&self, entry: &JournalEntry<'_>, id: AppointmentId) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let stored = journal_ids(&file)?.contains(&id);
        let rejected = match entry {
            JournalEntry::Persist { .. } if stored => Some(Error::State(format!(
                "Appointment {} is already persisted",
                id
            ))),
            JournalEntry::Merge { .. } if !stored => Some(Error::AppointmentNotFound(id)),
            _ => None,
        };
        if let Some(err) = rejected {
            file.unlock()?;
            return Err(err);
        }

        let torn_tail = ends_mid_line(&file)?;
        let mut writer = std::io::BufWriter::new(&file);
        if torn_tail {
            tracing::warn!("Journal {:?} ends with a partial line", self.path);
            writer.write_all(b"\n")?;
        }
        let line = serde_json::to_string(entry)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);
        file.sync_data()?;

        file.unlock()?;

        tracing::debug!("Appended appointment {} to journal", id);
        Ok(())
    }
}

impl AppointmentRepository for JsonlRepository {
    fn persist(&mut self, appointment: &Appointment) -> Result<()> {
        self.append(&JournalEntry::Persist { appointment }, appointment.id())
    }

    fn merge(&mut self, appointment: &Appointment) -> Result<()> {
        self.append(&JournalEntry::Merge { appointment }, appointment.id())
    }

    fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        Ok(self.load_all()?.into_iter().find(|a| a.id() == id))
    }

    fn load_all(&self) -> Result<Vec<Appointment>> {
        read_journal(&self.path)
    }

    /// Rewrites the journal through a temp file renamed over the original.
    fn replace_all(&mut self, appointments: &[Appointment]) -> Result<()> {
        self.ensure_parent_dir()?;

        let temp = NamedTempFile::new_in(self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "journal path missing parent")
        })?)?;

        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            for appointment in appointments {
                let line = serde_json::to_string(&JournalEntry::Persist { appointment })?;
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::info!(
            "Rewrote journal {:?} with {} appointments",
            self.path,
            appointments.len()
        );
        Ok(())
    }
}

/// Only the id of each journal line
#[derive(Deserialize)]
struct JournalId {
    appointment: IdOnly,
}

#[derive(Deserialize)]
struct IdOnly {
    id: AppointmentId,
}

/// Ids recorded in an open journal, skipping lines that don't parse
fn journal_ids(mut file: &File) -> Result<HashSet<AppointmentId>> {
    file.seek(SeekFrom::Start(0))?;
    let mut ids = HashSet::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if let Ok(record) = serde_json::from_str::<JournalId>(&line) {
            ids.insert(record.appointment.id);
        }
    }
    Ok(ids)
}

/// True when a crash left the last journal line without its newline
fn ends_mid_line(mut file: &File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Replay a journal file.
///
/// Returns an empty set if the file doesn't exist. Unparseable lines are
/// logged and skipped.
fn read_journal(path: &Path) -> Result<Vec<Appointment>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut appointments: Vec<Appointment> = Vec::new();
    let mut positions: HashMap<AppointmentId, usize> = HashMap::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        let appointment = match serde_json::from_str::<JournalRecord>(&line) {
            Ok(JournalRecord::Persist { appointment }) => appointment,
            Ok(JournalRecord::Merge { appointment }) => appointment,
            Err(e) => {
                tracing::warn!("Failed to parse journal line {}: {}", line_num + 1, e);
                continue;
            }
        };

        match positions.get(&appointment.id()) {
            Some(&idx) => appointments[idx] = appointment,
            None => {
                positions.insert(appointment.id(), appointments.len());
                appointments.push(appointment);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} appointments from journal", appointments.len());
    Ok(appointments)
}
