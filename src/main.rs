use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use devprep::config::{LogFormat, PrepConfig};
use devprep::io::{device_size, partition_size, queue_param, IoOp};
use devprep::probe::probe_for;
use devprep::units::{parse_size, pretty_size};
use devprep::zones::SysfsZoneReporter;
use devprep::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "devprep")]
#[command(about = "Prepare block devices and image files for a new filesystem")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Emit log events as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file (default: <config dir>/devprep/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reset zones or discard, clear old metadata and signatures
    Prepare {
        /// Device path (e.g., /dev/sdb) or image file
        device: PathBuf,

        /// Limit the usable size (accepts k/m/g/t suffixes)
        #[arg(long, value_parser = parse_size)]
        max_bytes: Option<u64>,

        /// Treat the device as zoned: reset all zones instead of discarding
        #[arg(long)]
        zoned: bool,

        /// Skip the full-device TRIM
        #[arg(long)]
        no_discard: bool,

        /// Also clear the last 2 MiB
        #[arg(long)]
        zero_end: bool,

        /// Print progress
        #[arg(short, long)]
        verbose: bool,

        /// Signature probe backend (magic, wipefs)
        #[arg(long)]
        probe: Option<ProbeBackend>,

        /// Print a JSON report instead of the usable size
        #[arg(long)]
        json: bool,

        /// Run against an in-memory copy of the device geometry and list the
        /// operations that would be issued
        #[arg(long)]
        dry_run: bool,
    },

    /// Report the first signature found on a device
    Probe {
        device: PathBuf,

        #[arg(long)]
        backend: Option<ProbeBackend>,
    },

    /// Print the size of a device or image file
    Size { device: PathBuf },

    /// Show the zone layout of a zoned device
    Zones { device: PathBuf },

    /// Read a request-queue parameter from sysfs
    QueueParam { device: PathBuf, param: String },
}

#[derive(Serialize)]
struct JsonReport<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    report: &'a PrepReport,
}

fn init_logging(debug: bool, format: LogFormat) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[allow(clippy::too_many_arguments)]
fn prepare(
    config: &PrepConfig,
    device: &Path,
    max_bytes: Option<u64>,
    zoned: bool,
    no_discard: bool,
    zero_end: bool,
    verbose: bool,
    probe: Option<ProbeBackend>,
    json: bool,
    dry_run: bool,
) -> Result<()> {
    let mut flags = config.flags();
    flags.zoned = zoned;
    flags.discard = flags.discard && !no_discard;
    flags.zero_end |= zero_end;
    flags.verbose |= verbose;

    let reporter = SysfsZoneReporter::default();
    let probe = probe_for(probe.unwrap_or(config.probe));
    let preparer = DevicePreparer::new(&reporter, &*probe);

    let report = if dry_run {
        let real = FileDevice::open_read_only(device)
            .with_context(|| format!("Failed to open {}", device.display()))?;
        let stat = real.stat()?;
        let size = device_size(&real, &stat);
        let sim = match stat.kind {
            DeviceKind::RegularFile => MemDevice::regular_file(device, size),
            _ => MemDevice::block_device(device, size),
        };

        let report = preparer.prepare(&sim, max_bytes, flags)?;
        for op in sim.ops() {
            print_op(&op);
        }
        report
    } else {
        let dev = FileDevice::open(device)
            .with_context(|| format!("Failed to open {} for writing", device.display()))?;
        preparer.prepare(&dev, max_bytes, flags)?
    };

    if json {
        let out = JsonReport {
            timestamp: Utc::now(),
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", report.usable_bytes);
    }

    Ok(())
}

fn print_op(op: &IoOp) {
    match op {
        IoOp::Discard { start, len } => println!("discard    {:>16} {:>16}", start, len),
        IoOp::Write { offset, len } => println!("zero       {:>16} {:>16}", offset, len),
        IoOp::ResetZone { start, len } => println!("reset-zone {:>16} {:>16}", start, len),
        IoOp::Sync => println!("sync"),
    }
}

fn probe_device(config: &PrepConfig, device: &Path, backend: Option<ProbeBackend>) -> Result<()> {
    let dev = FileDevice::open_read_only(device)
        .with_context(|| format!("Failed to open {}", device.display()))?;

    match probe_for(backend.unwrap_or(config.probe)).probe(&dev)? {
        Some(sig) => println!(
            "{}: {} signature at offset {:#x} ({} bytes)",
            device.display(),
            sig.name,
            sig.offset,
            sig.len
        ),
        None => println!("{}: no signature found", device.display()),
    }

    Ok(())
}

fn show_size(device: &Path) -> Result<()> {
    let dev = FileDevice::open_read_only(device)
        .with_context(|| format!("Failed to open {}", device.display()))?;
    let stat = dev.stat()?;

    let size = match device_size(&dev, &stat) {
        0 => partition_size(device),
        size => size,
    };
    if size == 0 {
        anyhow::bail!("unable to determine size of {}", device.display());
    }

    println!("{} ({})", size, pretty_size(size));
    Ok(())
}

fn show_zones(device: &Path) -> Result<()> {
    let dev = FileDevice::open_read_only(device)
        .with_context(|| format!("Failed to open {}", device.display()))?;

    let info = match SysfsZoneReporter::default().load_zone_info(&dev)? {
        Some(info) => info,
        None => {
            println!("{}: not zoned", device.display());
            return Ok(());
        }
    };

    println!("Zone Model: {:?}", info.model);
    println!("Zone Size: {}", pretty_size(info.zone_size));
    println!("Total Zones: {}", info.nr_zones());
    println!("Conventional Zones: {}", info.conventional_count());
    println!("Sequential Zones: {}", info.sequential_count());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PrepConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let log_format = if cli.log_json {
        LogFormat::Json
    } else {
        config.log_format
    };
    init_logging(cli.debug, log_format);

    match &cli.command {
        Commands::Prepare {
            device,
            max_bytes,
            zoned,
            no_discard,
            zero_end,
            verbose,
            probe,
            json,
            dry_run,
        } => prepare(
            &config,
            device,
            *max_bytes,
            *zoned,
            *no_discard,
            *zero_end,
            *verbose,
            *probe,
            *json,
            *dry_run,
        )?,
        Commands::Probe { device, backend } => probe_device(&config, device, *backend)?,
        Commands::Size { device } => show_size(device)?,
        Commands::Zones { device } => show_zones(device)?,
        Commands::QueueParam { device, param } => match queue_param(device, param) {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("{}: no queue parameter '{}'", device.display(), param),
        },
    }

    Ok(())
}
