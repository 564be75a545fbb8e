//! periconf CLI - configure and flash ESP32 peripheral boards.
//!
//! ## Features
//!
//! - MAC registry management for the BLE base (label and DUT modes)
//! - Board settings over the serial line protocol
//! - Serial monitor with settings reports and binary previews
//! - Firmware flashing through esptool with live progress
//! - Interactive serial port selection
//! - Dry-run mode printing the exact bytes that would be written
//! - Shell completion generation

use {
    anyhow::Result,
    clap::{ArgGroup, Parser, Subcommand, ValueEnum},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    log::debug,
    periconf::{BoardKind, DeviceMode, DutPreset},
    std::{env, path::PathBuf},
};

mod commands;
mod config;
mod output;
mod serial;

use {
    commands::{Context, DeviceAction},
    config::Config,
};

/// Errors that map onto dedicated exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or unusable environment (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// The user backed out of a prompt (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// periconf - configure and flash ESP32-based peripheral boards.
///
/// Environment variables:
///   PERICONF_PORT              - Default serial port
///   PERICONF_BOARD             - Default board type
///   PERICONF_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "periconf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "PERICONF_PORT")]
    port: Option<String>,

    /// Board type.
    #[arg(
        short,
        long,
        global = true,
        value_enum,
        default_value = "ble-base",
        env = "PERICONF_BOARD"
    )]
    board: Board,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "PERICONF_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Do not open a port; print what would be written instead.
    #[arg(long, global = true)]
    dry_run: bool,

    /// How long to wait for replies after a command, in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    listen_ms: Option<u64>,

    /// Show previews of binary data received from the device.
    #[arg(long, global = true)]
    show_binary: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Supported boards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Board {
    /// BLE beacon base (MAC registry, label/DUT modes).
    BleBase,
    /// Fuel-level indicator.
    FuelIndicator,
    /// Wi-Fi current sensor.
    CurrentSensor,
    /// Wi-Fi temperature sensor.
    TemperatureSensor,
    /// Temperature sensor with a BLE probe.
    TemperatureSensorBle,
    /// Attendance reader.
    AttendanceReader,
}

impl From<Board> for BoardKind {
    fn from(board: Board) -> Self {
        match board {
            Board::BleBase => BoardKind::BleBase,
            Board::FuelIndicator => BoardKind::FuelIndicator,
            Board::CurrentSensor => BoardKind::CurrentSensor,
            Board::TemperatureSensor => BoardKind::TemperatureSensor,
            Board::TemperatureSensorBle => BoardKind::TemperatureSensorBle,
            Board::AttendanceReader => BoardKind::AttendanceReader,
        }
    }
}

/// Registry mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Label MACs (mode 0).
    Label,
    /// DUT MACs (mode 1).
    Dut,
}

impl From<Mode> for DeviceMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Label => DeviceMode::Label,
            Mode::Dut => DeviceMode::Dut,
        }
    }
}

/// DUT sensor presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// Escort fuel-level sensor (byte number 8).
    Escort,
}

impl From<Preset> for DutPreset {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Escort => DutPreset::Escort,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List supported boards and their settings.
    Boards,

    /// Format a MAC address the way it is typed and check it.
    Mac {
        /// Address text, with or without colons.
        text: String,
    },

    /// Switch the registry mode.
    SetMode {
        #[arg(value_enum)]
        mode: Mode,
    },

    /// Register a label MAC.
    AddLabelMac {
        /// Address in AA:BB:CC:DD:EE:FF form.
        mac: String,
    },

    /// Register a DUT MAC in one of the six slots.
    #[command(group(ArgGroup::new("byte").required(true).args(["preset", "byte_number"])))]
    AddDutMac {
        /// Address in AA:BB:CC:DD:EE:FF form.
        mac: String,

        /// Slot number (1-6).
        #[arg(long)]
        position: u8,

        /// Known sensor preset.
        #[arg(long, value_enum)]
        preset: Option<Preset>,

        /// Custom byte number.
        #[arg(long)]
        byte_number: Option<String>,
    },

    /// Clear the MAC registry.
    DeleteAll,

    /// Delete one registry entry.
    DeleteAt {
        /// Entry position.
        position: String,
    },

    /// Ask the board to print its registry.
    ListMacs {
        /// Which registry to list.
        #[arg(long, value_enum, default_value = "label")]
        mode: Mode,
    },

    /// Ask the board to print its settings.
    GetSettings,

    /// Write one setting (see `periconf boards` for the keys).
    Set {
        /// Setting key, e.g. `update-interval` or `ssid`.
        setting: String,
        /// New value.
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Turn the board's diagnostic output on or off.
    DebugMode {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Print everything the board sends until Ctrl+C.
    Monitor {
        /// Do not send `getsettings` after connecting.
        #[arg(long)]
        no_settings_query: bool,
    },

    /// Flash a firmware image with esptool.
    Flash {
        /// Firmware image (defaults to the board's image in `flash.firmware_dir`).
        firmware: Option<PathBuf>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "periconf v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!(
            "{} {err:#}",
            style("error:")
                .red()
                .bold()
        );
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Offline commands need neither a config nor a port
    match &cli.command {
        Commands::ListPorts { json } => return commands::ports::cmd_list_ports(*json),
        Commands::Boards => {
            commands::ports::cmd_boards();
            return Ok(());
        },
        Commands::Mac { text } => return commands::ports::cmd_mac(text),
        Commands::Completions { shell, install } => {
            return if *install {
                commands::completions::cmd_completions_install(*shell)
            } else {
                let shell = shell
                    .or_else(commands::completions::detect_shell_type)
                    .ok_or_else(|| {
                        CliError::Usage(
                            "Could not detect your shell. Please specify it explicitly".into(),
                        )
                    })?;
                commands::completions::cmd_completions(shell);
                Ok(())
            };
        },
        _ => {},
    }

    let config = Config::load_with(
        cli.config_path
            .as_deref(),
    );
    let mut ctx = Context::new(
        BoardKind::from(cli.board).profile(),
        config,
        cli.port
            .clone(),
    );
    ctx.non_interactive = cli.non_interactive;
    ctx.quiet = cli.quiet;
    ctx.dry_run = cli.dry_run;
    if let Some(ms) = cli.listen_ms {
        ctx.config
            .session
            .listen_ms = Some(ms);
    }
    if cli.show_binary {
        ctx.config
            .session
            .show_binary = Some(true);
    }

    match &cli.command {
        Commands::Monitor { no_settings_query } => {
            commands::monitor::cmd_monitor(&mut ctx, !*no_settings_query)
        },
        Commands::Flash { firmware } => commands::flash::cmd_flash(&mut ctx, firmware.as_deref()),
        command => {
            let action = device_action(command)?;
            commands::device::cmd_device(&mut ctx, &action)
        },
    }
}

/// Translate a device subcommand into the action it performs.
fn device_action(command: &Commands) -> Result<DeviceAction> {
    let action = match command {
        Commands::SetMode { mode } => DeviceAction::SetMode((*mode).into()),
        Commands::AddLabelMac { mac } => DeviceAction::AddLabelMac(mac.clone()),
        Commands::AddDutMac {
            mac,
            position,
            preset,
            byte_number,
        } => {
            let byte_number = match (preset, byte_number) {
                (Some(preset), _) => periconf::ByteNumber::Preset((*preset).into()),
                (None, Some(text)) => periconf::ByteNumber::parse_custom(text)?,
                (None, None) => {
                    return Err(CliError::Usage("--preset or --byte-number is required".into()).into());
                },
            };
            DeviceAction::AddDutMac {
                mac: mac.clone(),
                position: *position,
                byte_number,
            }
        },
        Commands::DeleteAll => DeviceAction::DeleteAll,
        Commands::DeleteAt { position } => DeviceAction::DeleteAt(position.clone()),
        Commands::ListMacs { mode } => DeviceAction::ListMacs((*mode).into()),
        Commands::GetSettings => DeviceAction::GetSettings,
        Commands::Set { setting, value } => DeviceAction::Set {
            key: setting.clone(),
            value: value.clone(),
        },
        Commands::DebugMode { state } => DeviceAction::DebugMode(*state == Toggle::On),
        Commands::ListPorts { .. }
        | Commands::Boards
        | Commands::Mac { .. }
        | Commands::Monitor { .. }
        | Commands::Flash { .. }
        | Commands::Completions { .. } => {
            anyhow::bail!("not a device command")
        },
    };
    Ok(action)
}

/// Exit code for an error that reached `main`.
///
/// Usage problems (bad input, unsupported command, missing firmware) exit
/// with 2, cancelled prompts with 130, everything else with 1.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Cancelled(_) => 130,
        };
    }
    match err.downcast_ref::<periconf::Error>() {
        Some(
            periconf::Error::InvalidFormat(_)
            | periconf::Error::Unsupported(_)
            | periconf::Error::FlashPrecondition(_)
            | periconf::Error::Config(_),
        ) => 2,
        _ => 1,
    }
}
