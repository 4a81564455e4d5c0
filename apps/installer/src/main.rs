//! Mission installer command line.
//!
//! Usage:
//!   mission-installer devices
//!   mission-installer --device 0 missions
//!   mission-installer install <mission-id> survey.kmz --preview survey.jpg
//!   mission-installer --transport mtp preview <mission-id>
//!   mission-installer kmz
//!
//! Logs go to stderr, controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use log::{info, warn};
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

use mission_installer_lib::devices::{
    DeviceError, DeviceIdentity, DeviceOperations, DeviceOperationsFactory, TransportKind,
};
use mission_installer_lib::missions::{self, MissionLayout};
use mission_installer_lib::settings::{self, Settings};

/// Installs DJI waypoint missions on an Android remote controller.
#[derive(Parser, Debug)]
#[command(name = "mission-installer", version)]
struct Cli {
    /// Transport to use: "adb" or "mtp". Defaults to the settings preference,
    /// falling back to MTP when ADB isn't installed.
    #[arg(long, global = true)]
    transport: Option<String>,

    /// Device to use, by index in `devices` output or by device ID
    #[arg(long, global = true)]
    device: Option<String>,

    /// Settings file to read instead of the default one
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List devices and storages that hold the mission folder
    Devices,
    /// List missions on the selected device
    Missions,
    /// Replace a mission's KMZ (and optionally its preview image)
    Install {
        mission_id: Uuid,
        kmz: PathBuf,
        #[arg(long)]
        preview: Option<PathBuf>,
    },
    /// Download a mission's preview image into the cache
    Preview { mission_id: Uuid },
    /// List KMZ files in the local source folder
    Kmz,
}

enum CliError {
    Device(DeviceError),
    NoDevice(Option<String>),
    UnknownMission(Uuid),
}

impl From<DeviceError> for CliError {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(e) => f.write_str(&e.user_message()),
            Self::NoDevice(None) => f.write_str("No device with a mission folder was found. Is it plugged in and unlocked?"),
            Self::NoDevice(Some(wanted)) => write!(f, "No device matches \"{wanted}\". Run `devices` to see the list."),
            Self::UnknownMission(id) => write!(f, "Mission {id} isn't on the device"),
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings = match &cli.settings {
        Some(path) => settings::load_settings_from(path),
        None => settings::load_settings(),
    };

    if let Command::Kmz = cli.command {
        print_local_kmz(&settings);
        return Ok(());
    }

    let mut ops = open_transport(&settings, cli.transport.as_deref())?;
    let devices = ops.list_devices()?;

    if let Command::Devices = cli.command {
        if devices.is_empty() {
            println!("No devices found");
        }
        for (index, device) in devices.iter().enumerate() {
            println!("{index}: {} ({} {} {})", device.display_name(), ops.transport(), device.id(), device.storage_root());
        }
        return Ok(());
    }

    let device = select_device(&devices, cli.device.as_deref())?;
    ops.connect(device)?;
    let result = run_connected(ops.as_mut(), &settings, cli.command);
    ops.disconnect();
    result
}

fn open_transport(settings: &Settings, requested: Option<&str>) -> Result<Box<dyn DeviceOperations>, DeviceError> {
    let factory = DeviceOperationsFactory::from_settings(settings);
    if let Some(name) = requested {
        let mut ops = factory.create_by_name(name)?;
        ops.initialize()?;
        return Ok(ops);
    }
    let preferred = if settings.use_adb_by_default {
        TransportKind::Adb
    } else {
        TransportKind::Mtp
    };
    factory.create_initialized(preferred)
}

fn select_device<'a>(devices: &'a [DeviceIdentity], wanted: Option<&str>) -> Result<&'a DeviceIdentity, CliError> {
    let Some(wanted) = wanted else {
        if devices.len() > 1 {
            warn!("{} devices found, using the first one. Pick another with --device", devices.len());
        }
        return devices.first().ok_or(CliError::NoDevice(None));
    };
    let by_index = wanted.parse::<usize>().ok().and_then(|index| devices.get(index));
    by_index
        .or_else(|| devices.iter().find(|d| d.id() == wanted))
        .ok_or_else(|| CliError::NoDevice(Some(wanted.to_string())))
}

fn run_connected(ops: &mut dyn DeviceOperations, settings: &Settings, command: Command) -> Result<(), CliError> {
    let layout = MissionLayout::from_settings(settings);
    match command {
        Command::Missions => {
            let found = missions::list_missions(ops, &layout)?;
            if found.is_empty() {
                println!("No missions found");
            }
            for mission in found {
                let modified = mission
                    .last_modified
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}  {:>10} bytes  {}", mission.id, mission.size_bytes, modified);
            }
        }
        Command::Install {
            mission_id,
            kmz,
            preview,
        } => {
            let mission = missions::find_mission(ops, &layout, &mission_id)?.ok_or(CliError::UnknownMission(mission_id))?;
            let bytes = missions::install_mission(ops, &mission, &kmz, preview.as_deref())?;
            println!("Installed {} into {} ({} bytes)", kmz.display(), mission.id, bytes);
        }
        Command::Preview { mission_id } => {
            let mission = missions::find_mission(ops, &layout, &mission_id)?.ok_or(CliError::UnknownMission(mission_id))?;
            match missions::fetch_preview(ops, &mission, &settings.preview_cache_dir)? {
                Some(path) => println!("{}", path.display()),
                None => println!("Mission {} has no preview", mission.id),
            }
        }
        Command::Devices | Command::Kmz => {}
    }
    Ok(())
}

fn print_local_kmz(settings: &Settings) {
    info!("Looking for KMZ files in {}", settings.kmz_source_folder.display());
    let files = missions::list_local_kmz(&settings.kmz_source_folder);
    if files.is_empty() {
        println!("No KMZ files in {}", settings.kmz_source_folder.display());
    }
    for file in files {
        println!("{}  {:>10} bytes  {}", file.name, file.size_bytes, file.path.display());
    }
}
