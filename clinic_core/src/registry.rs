//! Arena of externally-owned entities.
//!
//! Patients, doctors, departments and rooms are owned by whoever feeds the
//! registry (a JSON file for the CLI). Records are keyed by surrogate id;
//! relations such as room → department are plain lookups into the arena.
//! Natural keys (patient/doctor DNI, room number) are indexed for CSV
//! reference resolution.

use crate::{
    Department, DepartmentId, Doctor, DoctorId, EntityKind, Error, Patient, PatientId, Result,
    Room, RoomId, Specialty,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Borrowed view of any registry entity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityRef<'a> {
    Patient(&'a Patient),
    Doctor(&'a Doctor),
    Room(&'a Room),
    Department(&'a Department),
}

/// On-disk registry format
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub departments: Vec<Department>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub doctors: Vec<Doctor>,
    #[serde(default)]
    pub patients: Vec<Patient>,
}

#[derive(Clone, Debug, Default)]
pub struct Registry {
    patients: HashMap<PatientId, Patient>,
    doctors: HashMap<DoctorId, Doctor>,
    departments: HashMap<DepartmentId, Department>,
    rooms: HashMap<RoomId, Room>,
    patients_by_dni: HashMap<String, PatientId>,
    doctors_by_dni: HashMap<String, DoctorId>,
    rooms_by_number: HashMap<String, RoomId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a registry from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: RegistryFile = serde_json::from_str(&contents)?;
        let registry = Self::from_file(file)?;

        tracing::info!(
            "Loaded registry from {:?}: {} patients, {} doctors, {} rooms, {} departments",
            path,
            registry.patients.len(),
            registry.doctors.len(),
            registry.rooms.len(),
            registry.departments.len()
        );
        Ok(registry)
    }

    /// Build a registry from its file representation.
    ///
    /// Departments are inserted before rooms so room → department links
    /// can be checked.
    pub fn from_file(file: RegistryFile) -> Result<Self> {
        let mut registry = Self::new();
        for department in file.departments {
            registry.add_department(department)?;
        }
        for room in file.rooms {
            registry.add_room(room)?;
        }
        for doctor in file.doctors {
            registry.add_doctor(doctor)?;
        }
        for patient in file.patients {
            registry.add_patient(patient)?;
        }
        Ok(registry)
    }

    pub fn add_department(&mut self, department: Department) -> Result<()> {
        if department.name.trim().is_empty() {
            return Err(Error::Registry(format!(
                "Department {} has empty name",
                department.id
            )));
        }
        if self.departments.contains_key(&department.id) {
            return Err(Error::Registry(format!(
                "Duplicate department id {}",
                department.id
            )));
        }
        self.departments.insert(department.id, department);
        Ok(())
    }

    pub fn add_room(&mut self, room: Room) -> Result<()> {
        check_natural_key(EntityKind::Room, &room.number)?;
        if self.rooms.contains_key(&room.id) {
            return Err(Error::Registry(format!("Duplicate room id {}", room.id)));
        }
        if self.rooms_by_number.contains_key(&room.number) {
            return Err(Error::Registry(format!(
                "Duplicate room number {}",
                room.number
            )));
        }
        if !self.departments.contains_key(&room.department_id) {
            return Err(Error::Registry(format!(
                "Room {} references unknown department {}",
                room.number, room.department_id
            )));
        }
        self.rooms_by_number.insert(room.number.clone(), room.id);
        self.rooms.insert(room.id, room);
        Ok(())
    }

    pub fn add_doctor(&mut self, doctor: Doctor) -> Result<()> {
        check_natural_key(EntityKind::Doctor, &doctor.dni)?;
        if self.doctors.contains_key(&doctor.id) {
            return Err(Error::Registry(format!("Duplicate doctor id {}", doctor.id)));
        }
        if self.doctors_by_dni.contains_key(&doctor.dni) {
            return Err(Error::Registry(format!(
                "Duplicate doctor DNI {}",
                doctor.dni
            )));
        }
        self.doctors_by_dni.insert(doctor.dni.clone(), doctor.id);
        self.doctors.insert(doctor.id, doctor);
        Ok(())
    }

    pub fn add_patient(&mut self, patient: Patient) -> Result<()> {
        check_natural_key(EntityKind::Patient, &patient.dni)?;
        if self.patients.contains_key(&patient.id) {
            return Err(Error::Registry(format!(
                "Duplicate patient id {}",
                patient.id
            )));
        }
        if self.patients_by_dni.contains_key(&patient.dni) {
            return Err(Error::Registry(format!(
                "Duplicate patient DNI {}",
                patient.dni
            )));
        }
        self.patients_by_dni.insert(patient.dni.clone(), patient.id);
        self.patients.insert(patient.id, patient);
        Ok(())
    }

    pub fn patient(&self, id: PatientId) -> Option<&Patient> {
        self.patients.get(&id)
    }

    pub fn doctor(&self, id: DoctorId) -> Option<&Doctor> {
        self.doctors.get(&id)
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn department(&self, id: DepartmentId) -> Option<&Department> {
        self.departments.get(&id)
    }

    pub fn require_patient(&self, id: PatientId) -> Result<&Patient> {
        self.patient(id)
            .ok_or_else(|| missing_id(EntityKind::Patient, id.0))
    }

    pub fn require_doctor(&self, id: DoctorId) -> Result<&Doctor> {
        self.doctor(id).ok_or_else(|| missing_id(EntityKind::Doctor, id.0))
    }

    pub fn require_room(&self, id: RoomId) -> Result<&Room> {
        self.room(id).ok_or_else(|| missing_id(EntityKind::Room, id.0))
    }

    /// Department a room belongs to
    pub fn room_department(&self, room: &Room) -> Result<&Department> {
        self.department(room.department_id)
            .ok_or_else(|| missing_id(EntityKind::Department, room.department_id.0))
    }

    pub fn room_specialty(&self, room: &Room) -> Result<Specialty> {
        Ok(self.room_department(room)?.specialty)
    }

    pub fn patient_by_dni(&self, dni: &str) -> Option<&Patient> {
        self.patients_by_dni
            .get(dni)
            .and_then(|id| self.patients.get(id))
    }

    pub fn doctor_by_dni(&self, dni: &str) -> Option<&Doctor> {
        self.doctors_by_dni
            .get(dni)
            .and_then(|id| self.doctors.get(id))
    }

    pub fn room_by_number(&self, number: &str) -> Option<&Room> {
        self.rooms_by_number
            .get(number)
            .and_then(|id| self.rooms.get(id))
    }

    /// Look up an entity by its natural key.
    ///
    /// Departments have no unique natural key; they are matched by name
    /// and the lowest id wins.
    pub fn find_by_natural_key(&self, kind: EntityKind, key: &str) -> Option<EntityRef<'_>> {
        match kind {
            EntityKind::Patient => self.patient_by_dni(key).map(EntityRef::Patient),
            EntityKind::Doctor => self.doctor_by_dni(key).map(EntityRef::Doctor),
            EntityKind::Room => self.room_by_number(key).map(EntityRef::Room),
            EntityKind::Department => self
                .departments
                .values()
                .filter(|d| d.name == key)
                .min_by_key(|d| d.id)
                .map(EntityRef::Department),
        }
    }
}

fn check_natural_key(kind: EntityKind, key: &str) -> Result<()> {
    // Natural keys travel through comma-separated rows verbatim
    if key.trim().is_empty() || key.contains([',', '\n', '\r']) {
        return Err(Error::Registry(format!(
            "{} has invalid natural key {:?}",
            kind, key
        )));
    }
    Ok(())
}

fn missing_id(kind: EntityKind, id: u64) -> Error {
    Error::ReferenceNotFound {
        kind,
        key: format!("#{}", id),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two departments, two rooms, two doctors and two patients.
    ///
    /// Room R-1 and doctor 12345678 are cardiology; room N-1 and doctor
    /// 87654321 are neurology.
    pub(crate) fn sample_registry() -> Registry {
        let file: RegistryFile = serde_json::from_str(SAMPLE_JSON).unwrap();
        Registry::from_file(file).unwrap()
    }

    pub(crate) const SAMPLE_JSON: &str = r#"{
        "departments": [
            {"id": 1, "name": "Cardiology", "specialty": "CARDIOLOGY"},
            {"id": 2, "name": "Neurology", "specialty": "NEUROLOGY"}
        ],
        "rooms": [
            {"id": 1, "number": "R-1", "kind": "consulting", "department_id": 1},
            {"id": 2, "number": "N-1", "kind": "consulting", "department_id": 2}
        ],
        "doctors": [
            {"id": 1, "dni": "12345678", "first_name": "Ana", "last_name": "Lopez",
             "specialty": "CARDIOLOGY", "license": "MP-12345"},
            {"id": 2, "dni": "87654321", "first_name": "Luis", "last_name": "Gomez",
             "specialty": "NEUROLOGY"}
        ],
        "patients": [
            {"id": 1, "dni": "99999999", "first_name": "Maria", "last_name": "Perez"},
            {"id": 2, "dni": "11111111", "first_name": "Jorge", "last_name": "Diaz"}
        ]
    }"#;

    #[test]
    fn test_sample_registry_loads() {
        let registry = sample_registry();
        assert_eq!(registry.patient_by_dni("99999999").unwrap().id, PatientId(1));
        assert_eq!(registry.doctor_by_dni("87654321").unwrap().id, DoctorId(2));

        let room = registry.room_by_number("R-1").unwrap();
        assert_eq!(registry.room_specialty(room).unwrap(), Specialty::Cardiology);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("registry.json");
        std::fs::write(&path, SAMPLE_JSON).unwrap();

        let registry = Registry::load(&path).unwrap();
        assert!(registry.room(RoomId(2)).is_some());
    }

    #[test]
    fn test_find_by_natural_key() {
        let registry = sample_registry();

        assert!(matches!(
            registry.find_by_natural_key(EntityKind::Room, "N-1"),
            Some(EntityRef::Room(room)) if room.id == RoomId(2)
        ));
        assert!(matches!(
            registry.find_by_natural_key(EntityKind::Department, "Cardiology"),
            Some(EntityRef::Department(d)) if d.id == DepartmentId(1)
        ));
        assert!(registry
            .find_by_natural_key(EntityKind::Patient, "00000000")
            .is_none());
    }

    #[test]
    fn test_rejects_duplicate_dni() {
        let mut registry = sample_registry();
        let result = registry.add_patient(Patient {
            id: PatientId(3),
            dni: "99999999".into(),
            first_name: "Dup".into(),
            last_name: "Licate".into(),
        });
        assert!(matches!(result, Err(Error::Registry(_))));
        assert!(registry.patient(PatientId(3)).is_none());
    }

    #[test]
    fn test_rejects_room_with_unknown_department() {
        let mut registry = sample_registry();
        let result = registry.add_room(Room {
            id: RoomId(3),
            number: "X-1".into(),
            kind: String::new(),
            department_id: DepartmentId(42),
        });
        assert!(matches!(result, Err(Error::Registry(_))));
    }

    #[test]
    fn test_rejects_comma_in_natural_key() {
        let mut registry = Registry::new();
        let result = registry.add_patient(Patient {
            id: PatientId(1),
            dni: "1,2".into(),
            first_name: "A".into(),
            last_name: "B".into(),
        });
        assert!(matches!(result, Err(Error::Registry(_))));
    }

    #[test]
    fn test_rejects_line_breaks_in_natural_key() {
        let mut registry = Registry::new();
        for dni in ["1234\r5678", "1234\n5678"] {
            let result = registry.add_patient(Patient {
                id: PatientId(1),
                dni: dni.into(),
                first_name: "A".into(),
                last_name: "B".into(),
            });
            assert!(matches!(result, Err(Error::Registry(_))), "{:?}", dni);
        }
        assert!(registry.patient_by_dni("1234\r5678").is_none());
    }

    #[test]
    fn test_require_reports_missing_reference() {
        let registry = sample_registry();
        assert!(matches!(
            registry.require_doctor(DoctorId(9)),
            Err(Error::ReferenceNotFound { kind: EntityKind::Doctor, key }) if key == "#9"
        ));
    }
}
