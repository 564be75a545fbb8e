//! Interactive serial port selection.
//!
//! Port resolution order:
//! - explicit `--port` / `PERICONF_PORT`
//! - the port remembered in the configuration
//! - the only detected port (USB-serial bridges used on the boards first)
//! - an interactive choice via dialoguer
//!
//! Non-interactive mode never prompts; anything but exactly one candidate is a
//! usage error.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info},
    periconf::{NativePortEnumerator, PortEnumerator, PortInfo},
    std::io::IsTerminal,
};

/// USB-serial bridges found on the supported boards.
const KNOWN_BRIDGES: &[(u16, u16, &str)] = &[
    (0x10C4, 0xEA60, "CP210x"),
    (0x1A86, 0x7523, "CH340"),
    (0x1A86, 0x55D4, "CH9102"),
    (0x0403, 0x6001, "FT232R"),
    (0x0403, 0x6015, "FT231X"),
];

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Non-interactive mode (fail if the choice is ambiguous).
    pub non_interactive: bool,
}

/// Result of port selection.
#[derive(Debug)]
pub struct SelectedPort {
    /// The selected port info.
    pub port: PortInfo,
    /// Whether the user picked it from a prompt.
    pub prompted: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Name of the bridge chip behind `port`, if it is one the boards use.
fn bridge_name(port: &PortInfo) -> Option<&'static str> {
    let (vid, pid) = (port.vid?, port.pid?);
    KNOWN_BRIDGES
        .iter()
        .find(|(v, p, _)| *v == vid && *p == pid)
        .map(|(_, _, name)| *name)
}

fn placeholder(name: &str) -> PortInfo {
    PortInfo {
        name: name.to_string(),
        vid: None,
        pid: None,
        manufacturer: None,
        product: None,
    }
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    if let Some(port_name) = &options.port {
        return Ok(SelectedPort {
            port: placeholder(port_name),
            prompted: false,
        });
    }

    if let Some(port_name) = &config
        .port
        .serial
    {
        debug!("Using port from config: {port_name}");
        return Ok(SelectedPort {
            port: placeholder(port_name),
            prompted: false,
        });
    }

    let ports = NativePortEnumerator::list_ports()?;
    choose_port(candidates(ports), options.non_interactive)
}

/// Narrow the detected ports to known bridges when there are any.
fn candidates(ports: Vec<PortInfo>) -> Vec<PortInfo> {
    let (known, unknown): (Vec<PortInfo>, Vec<PortInfo>) = ports
        .into_iter()
        .partition(|p| bridge_name(p).is_some());
    if known.is_empty() { unknown } else { known }
}

fn choose_port(mut ports: Vec<PortInfo>, non_interactive: bool) -> Result<SelectedPort> {
    match ports.len() {
        0 => Err(usage_err(
            "No serial ports found. Connect the board or pass --port",
        )),
        1 => {
            let port = ports.remove(0);
            info!("Auto-selected port: {}", port.name);
            Ok(SelectedPort {
                port,
                prompted: false,
            })
        },
        _ if non_interactive => Err(usage_err(
            "Multiple serial ports found; pass --port in non-interactive mode",
        )),
        _ => {
            ensure_interactive_terminal()?;
            select_port_interactive(ports)
        },
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Port selection needs an interactive terminal; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Port selection cancelled".to_string()).into()
            } else {
                usage_err("Port selection prompt failed")
            }
        },
    }
}

fn port_label(port: &PortInfo) -> String {
    let bridge = bridge_name(port)
        .map(|name| format!(" [{}]", style(name).yellow()))
        .unwrap_or_default();
    let vid_pid = match (port.vid, port.pid) {
        (Some(vid), Some(pid)) if bridge.is_empty() => format!(" ({vid:04X}:{pid:04X})"),
        _ => String::new(),
    };
    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{}{bridge}{vid_pid}{product}", port.name)
}

fn select_port_interactive(ports: Vec<PortInfo>) -> Result<SelectedPort> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    // Truncate labels to fit terminal width to prevent wrapping
    let term_width = console::Term::stderr()
        .size()
        .1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p), max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => {
            let port = ports
                .into_iter()
                .nth(index)
                .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}"))?;
            Ok(SelectedPort {
                port,
                prompted: true,
            })
        },
        None => Err(CliError::Cancelled("Port selection cancelled".to_string()).into()),
    }
}

/// Ask the user whether to remember `port` in the local config file.
pub fn ask_remember_port(port: &str, config: &mut Config) -> Result<()> {
    if !(std::io::stdin().is_terminal() && std::io::stderr().is_terminal()) {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Remember {port} for next time?"))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.save_port(port) {
            error!("Failed to save port configuration: {e}");
        }
    }

    Ok(())
}
