//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod device;
pub(crate) mod flash;
pub(crate) mod monitor;
pub(crate) mod ports;

use {
    crate::{
        config::Config,
        serial::{SerialOptions, ask_remember_port, select_serial_port},
    },
    anyhow::{Context as _, Result},
    periconf::BoardProfile,
    std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

pub(crate) use device::DeviceAction;

/// Everything a device command needs besides its own arguments.
pub(crate) struct Context {
    /// Selected board.
    pub profile: &'static BoardProfile,
    /// Merged configuration; command-line overrides are already applied.
    pub config: Config,
    /// Port given with `--port` or `PERICONF_PORT`.
    pub port: Option<String>,
    pub non_interactive: bool,
    pub quiet: bool,
    pub dry_run: bool,
}

impl Context {
    pub(crate) fn new(profile: &'static BoardProfile, config: Config, port: Option<String>) -> Self {
        Self {
            profile,
            config,
            port,
            non_interactive: false,
            quiet: false,
            dry_run: false,
        }
    }

    /// Pick the serial port, prompting when needed.
    ///
    /// A port picked from a prompt is offered to be remembered.
    pub(crate) fn resolve_port(&mut self) -> Result<String> {
        let options = SerialOptions {
            port: self
                .port
                .clone(),
            non_interactive: self.non_interactive,
        };
        let selected = select_serial_port(&options, &self.config)?;

        if selected.prompted {
            ask_remember_port(
                &selected
                    .port
                    .name,
                &mut self.config,
            )?;
        }

        Ok(selected
            .port
            .name)
    }
}

/// Install the Ctrl+C handler and return the flag it sets.
pub(crate) fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))
        .context("Failed to install Ctrl+C handler")?;
    Ok(flag)
}
