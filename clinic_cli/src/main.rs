use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use clinic_core::*;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const REGISTRY_FILE: &str = "registry.json";
const JOURNAL_FILE: &str = "appointments.wal";

#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Clinic appointment scheduling system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Book a new appointment
    Schedule {
        /// Patient DNI
        #[arg(long)]
        patient: String,

        /// Doctor DNI
        #[arg(long)]
        doctor: String,

        /// Room number
        #[arg(long)]
        room: String,

        /// Date and time, e.g. 2030-01-01T10:00:00
        #[arg(long, value_parser = parse_at)]
        at: NaiveDateTime,

        /// Cost with up to two decimals
        #[arg(long)]
        cost: Money,
    },

    /// Cancel a scheduled appointment
    Cancel {
        id: u64,

        /// Reason recorded in the appointment notes
        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Apply a status action: advance, cancel or no_show
    Advance { id: u64, action: String },

    /// List appointments
    List(ListArgs),

    /// Export all appointments to CSV ("-" for stdout)
    Export { path: PathBuf },

    /// Replace all appointments with the contents of a CSV file
    Import { path: PathBuf },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ListArgs {
    /// Appointments of the patient with this DNI
    #[arg(long)]
    patient: Option<String>,

    /// Appointments holding a slot with the doctor with this DNI
    #[arg(long)]
    doctor: Option<String>,

    /// Appointments holding a slot in this room
    #[arg(long)]
    room: Option<String>,

    /// Every appointment, in creation order
    #[arg(long)]
    all: bool,
}

fn parse_at(s: &str) -> std::result::Result<NaiveDateTime, String> {
    csv_codec::parse_date_time(s)
        .ok_or_else(|| format!("expected YYYY-MM-DDTHH:MM[:SS], got {:?}", s))
}

fn main() -> Result<()> {
    clinic_core::logging::init_with_level("warn");

    let cli = Cli::parse();

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let engine = open_engine(&data_dir, &config)?;

    match cli.command {
        Commands::Schedule {
            patient,
            doctor,
            room,
            at,
            cost,
        } => cmd_schedule(&engine, &patient, &doctor, &room, at, cost),
        Commands::Cancel { id, reason } => cmd_cancel(&engine, id, &reason),
        Commands::Advance { id, action } => cmd_advance(&engine, id, &action),
        Commands::List(args) => cmd_list(&engine, args),
        Commands::Export { path } => cmd_export(&engine, &path),
        Commands::Import { path } => cmd_import(&engine, &path),
    }
}

fn open_engine(data_dir: &Path, config: &Config) -> Result<SchedulingEngine<JsonlRepository>> {
    let registry_path = data_dir.join(REGISTRY_FILE);
    if !registry_path.exists() {
        return Err(Error::Config(format!(
            "No entity registry at {}",
            registry_path.display()
        )));
    }

    let registry = Registry::load(&registry_path)?;
    let repository = JsonlRepository::new(data_dir.join(JOURNAL_FILE));
    SchedulingEngine::restore(registry, repository, &config.scheduling)
}

fn resolve_patient(registry: &Registry, dni: &str) -> Result<PatientId> {
    registry
        .patient_by_dni(dni)
        .map(|p| p.id)
        .ok_or_else(|| Error::ReferenceNotFound {
            kind: EntityKind::Patient,
            key: dni.to_string(),
        })
}

fn resolve_doctor(registry: &Registry, dni: &str) -> Result<DoctorId> {
    registry
        .doctor_by_dni(dni)
        .map(|d| d.id)
        .ok_or_else(|| Error::ReferenceNotFound {
            kind: EntityKind::Doctor,
            key: dni.to_string(),
        })
}

fn resolve_room(registry: &Registry, number: &str) -> Result<RoomId> {
    registry
        .room_by_number(number)
        .map(|r| r.id)
        .ok_or_else(|| Error::ReferenceNotFound {
            kind: EntityKind::Room,
            key: number.to_string(),
        })
}

fn cmd_schedule(
    engine: &SchedulingEngine<JsonlRepository>,
    patient: &str,
    doctor: &str,
    room: &str,
    at: NaiveDateTime,
    cost: Money,
) -> Result<()> {
    let registry = engine.registry();
    let appointment = engine.schedule(
        resolve_patient(registry, patient)?,
        resolve_doctor(registry, doctor)?,
        resolve_room(registry, room)?,
        at,
        cost,
    )?;

    println!("✓ Scheduled appointment {}", appointment.id());
    display_appointment(registry, &appointment);
    Ok(())
}

fn cmd_cancel(engine: &SchedulingEngine<JsonlRepository>, id: u64, reason: &str) -> Result<()> {
    let appointment = engine.cancel(AppointmentId(id), reason)?;

    println!("✓ Cancelled appointment {}", appointment.id());
    display_appointment(engine.registry(), &appointment);
    Ok(())
}

fn cmd_advance(engine: &SchedulingEngine<JsonlRepository>, id: u64, action: &str) -> Result<()> {
    let action: Action = action.parse()?;
    let appointment = engine.advance_status(AppointmentId(id), action)?;

    println!(
        "✓ Appointment {} is now {}",
        appointment.id(),
        appointment.status()
    );
    Ok(())
}

fn cmd_list(engine: &SchedulingEngine<JsonlRepository>, args: ListArgs) -> Result<()> {
    let registry = engine.registry();

    let appointments = if let Some(dni) = args.patient {
        engine.query_by_patient(resolve_patient(registry, &dni)?)
    } else if let Some(dni) = args.doctor {
        engine.query_by_doctor(resolve_doctor(registry, &dni)?)
    } else if let Some(number) = args.room {
        engine.query_by_room(resolve_room(registry, &number)?)
    } else {
        engine.all()
    };

    if appointments.is_empty() {
        println!("No appointments found.");
        return Ok(());
    }

    for appointment in &appointments {
        display_appointment(registry, appointment);
    }
    Ok(())
}

fn cmd_export(engine: &SchedulingEngine<JsonlRepository>, path: &Path) -> Result<()> {
    if path == Path::new("-") {
        let stdout = io::stdout();
        engine.export_csv(stdout.lock())?;
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    let count = engine.export_csv(&mut writer)?;
    writer.flush()?;

    println!("✓ Exported {} appointments", count);
    println!("  CSV: {}", path.display());
    Ok(())
}

fn cmd_import(engine: &SchedulingEngine<JsonlRepository>, path: &Path) -> Result<()> {
    let reader = BufReader::new(File::open(path)?);
    let count = engine.import_csv(reader)?;

    println!("✓ Imported {} appointments", count);
    Ok(())
}

fn display_appointment(registry: &Registry, appointment: &Appointment) {
    let patient = registry
        .patient(appointment.patient_id())
        .map_or("?", |p| p.dni.as_str());
    let doctor = registry
        .doctor(appointment.doctor_id())
        .map_or("?", |d| d.dni.as_str());
    let room = registry
        .room(appointment.room_id())
        .map_or("?", |r| r.number.as_str());

    println!(
        "  #{:<4} {}  {:<11}  patient {}  doctor {}  room {}  {}",
        appointment.id(),
        csv_codec::format_date_time(appointment.date_time()),
        appointment.status(),
        patient,
        doctor,
        room,
        appointment.cost()
    );
    if !appointment.notes().is_empty() {
        println!("        {}", appointment.notes());
    }

    let actions = transition::allowed_actions(appointment.status());
    if !actions.is_empty() {
        let names: Vec<_> = actions.iter().map(|a| a.as_str()).collect();
        println!("        actions: {}", names.join(", "));
    }
}
