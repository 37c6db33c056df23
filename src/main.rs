// in-crate modules
mod adjust;
mod brightness_table;
mod config;
mod monitor;
mod sensor;

// in-crate imports
use adjust::*;
use config::*;
use monitor::*;
use sensor::*;

// my libraries
use xdg_dirs::{dirs, xdg_location_of, xdg_user_dir};

// STD
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

// 3rd party libraries
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "ha-adaptive-brightness/config.ron";

#[derive(Debug, Subcommand, PartialEq)]
enum Command {
    #[command(
        about = "(default) Read the Home Assistant light sensor once and update the monitor brightness if it differs from the target."
    )]
    Run {
        #[arg(long, help = "Work out the new brightness but don't write it to the monitor.")]
        dry_run: bool,
    },

    #[command(
        about = "Check the configuration, list detected displays, and show the sensor reading and target brightness without changing anything."
    )]
    Check,

    #[command(about = "Generate a default config file")]
    GenConfig,

    #[command(about = "Print the lux to brightness table in the order bands are matched")]
    Table,
}

#[derive(Debug, Parser, PartialEq)]
#[command(
    about = "Set monitor brightness over DDC/CI from a Home Assistant ambient light sensor",
    version
)]
struct Args {
    #[arg(
        global = true,
        short,
        long = "config",
        help = format!("Path to configuration file. Defaults to `{CONFIG_PATH}` under the user's config directory."),
    )]
    config_path: Option<PathBuf>,

    #[arg(
        global = true,
        long = "env-file",
        help = "Load HA_* variables from this file instead of `.env` in the working directory."
    )]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Args {
    /// Get the config path, and verify the file exists. This is the either the path passed as an arg, or from the XDG directory if not specified.
    ///
    /// This returns error if the path does not exist.
    fn get_config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config_path {
            Some(path) => path
                .canonicalize()
                .with_context(|| format!("Could not open config file `{0}`", path.display())),
            None => xdg_location_of(&dirs::CONFIG, CONFIG_PATH)
                .with_context(|| "Could not open config file"),
        }
    }
}

/// Load the configuration based on arguments.
/// Uses the file supplied to the CLI, or in the default location if not specified, or the default config if there is no file.
fn get_config(args: &Args) -> anyhow::Result<Config> {
    match args.get_config_path() {
        Ok(path) => {
            tracing::info!("reading config from {}", path.display());
            Config::read_from_file(&path)
                .with_context(|| format!("Failed to parse config file `{0}`", path.display()))
        }
        Err(err) if args.config_path.is_some() => Err(err),
        Err(err) => {
            tracing::debug!("no config file, using defaults: {err:#}");
            Ok(Config::default())
        }
    }
}

/// Read the Home Assistant settings from the environment, after loading the env file.
fn get_ha_config(args: &Args, on_error: ErrorPolicy) -> anyhow::Result<HaConfig> {
    load_env_file(args.env_file.as_deref())?;
    let ha = HaConfig::from_env();
    check_missing_vars(&ha, on_error)?;
    Ok(ha)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("args = {args:?}");

    // process commands
    match args.command {
        // Primary behaviour: one sensor read and (maybe) one monitor update
        None => run(&args, false),
        Some(Command::Run { dry_run }) => run(&args, dry_run),

        // Show what a run would see and do
        Some(Command::Check) => check(&args),

        // Generate config file: if the file does not already exist, write
        Some(Command::GenConfig) => gen_config_file(&args),

        Some(Command::Table) => print_table(&args),
    }
}

/// Default behaviour: read the sensor once and update the configured monitor.
fn run(args: &Args, dry_run: bool) -> anyhow::Result<()> {
    let config = get_config(args)?;
    let ha = get_ha_config(args, config.on_error)?;

    let sensor = HomeAssistant::new(&ha).with_context(|| "Failed to create HTTP client")?;
    let monitors = Ddcutil::new(config.ddcutil.clone());

    let adjuster = Adjuster {
        table: config.brightness_table(),
        monitor: config.monitor,
        on_error: config.on_error,
        dry_run,
    };

    match adjuster.run(&sensor, &monitors)? {
        Outcome::Updated { from, to } => tracing::debug!("brightness changed {from}% -> {to}%"),
        Outcome::WriteFailed { to, .. } => tracing::debug!("brightness not changed to {to}%"),
        Outcome::Unchanged { .. } | Outcome::WouldUpdate { .. } => {}
    }
    Ok(())
}

/// Verify the setup without changing anything: config, displays, and sensor.
fn check(args: &Args) -> anyhow::Result<()> {
    // Try to _find_ and _parse_ the config file
    match args.get_config_path() {
        Ok(path) => println!("Using config file `{0}`", path.display()),
        Err(_) if args.config_path.is_none() => println!("No config file, using defaults"),
        Err(err) => return Err(err),
    }
    let config = get_config(args)?;
    println!("Configuration: {config:#?}");

    // Environment
    let ha = get_ha_config(args, ErrorPolicy::Continue)?;
    let missing = ha.missing_vars();
    if missing.is_empty() {
        println!("\nHome Assistant entity: {0}", HomeAssistant::state_url(&ha));
    } else {
        println!("\nMissing environment variables: {0}", missing.join(", "));
    }

    // Detect monitors and match them up with the configured selector
    println!("\nDetecting displays...");
    let monitors = Ddcutil::new(config.ddcutil.clone());
    let displays = detect_displays(&monitors);
    let selected = select_display(&displays, &config.monitor);
    for display in &displays {
        let marker = match &selected {
            Ok(d) if *d == display => " <- selected",
            _ => "",
        };
        println!("{display}{marker}");
    }

    match selected {
        Ok(display) => match monitors.get_brightness(display) {
            Ok(v) => println!("  Brightness: {0} (max {1})", v.current, v.max),
            Err(e) => println!("  Could not read brightness: {e}"),
        },
        Err(e) => println!("  No matching display: {e}"),
    }

    // Sensor
    println!("\nReading sensor...");
    let sensor = HomeAssistant::new(&ha)?;
    let reading = match sensor.fetch() {
        Ok(r) => r,
        Err(e) => {
            println!("  Could not read sensor from {0}: {e}", sensor.url());
            return Ok(());
        }
    };
    println!(
        "  {0} ({1}) = {2:?} {3}",
        reading
            .attributes
            .friendly_name
            .as_deref()
            .unwrap_or("unnamed"),
        reading.entity_id,
        reading.state,
        reading.attributes.unit_of_measurement.as_deref().unwrap_or(""),
    );
    println!(
        "  last changed {0}, last reported {1}",
        reading.last_changed, reading.last_reported
    );
    match reading.lux() {
        Ok(lux) => println!(
            "  Target brightness: {0}%",
            config.brightness_table().percentage_for(lux)
        ),
        Err(e) => println!("  {e}"),
    }

    Ok(())
}

/// List displays for `check`, reporting a detection failure instead of returning it.
fn detect_displays<M: MonitorControl>(monitors: &M) -> Vec<DisplayInfo> {
    match monitors.enumerate() {
        Ok(displays) => displays,
        Err(e) => {
            println!("  Could not detect displays: {e}");
            Vec::new()
        }
    }
}

/// Generate a default configuration file, at the expected location based on args or environment variables.
fn gen_config_file(args: &Args) -> anyhow::Result<()> {
    // CLI arg path, or default from environment
    let path = args
        .config_path
        .clone()
        .map_or_else(|| xdg_user_dir(&dirs::CONFIG, CONFIG_PATH), Ok)
        .with_context(|| "Could not determine location for config file")?;

    // Create parent directory path if applicable
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "Failed to create parent directory of the new config file {0}",
                path.display()
            )
        })?;
    }

    // Create the new file and write the default contents
    let mut file = File::create_new(&path)
        .with_context(|| format!("Failed to create new config file {0}", path.display()))?;
    write!(file, "{}", DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write the new config file {0}", path.display()))?;

    println!("Wrote default config to {0}", path.display());
    Ok(())
}

fn print_table(args: &Args) -> anyhow::Result<()> {
    let config = get_config(args)?;
    let table = config.brightness_table();
    if config.bands.is_some() {
        println!("Bands from config file (first match wins):");
    } else {
        println!("Built-in bands (first match wins):");
    }
    for (i, band) in table.bands().iter().enumerate() {
        println!("  {i}: {band}");
    }
    println!("Anything else: 0%");
    Ok(())
}
