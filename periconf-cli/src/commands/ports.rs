//! Offline commands: port listing, board listing and MAC formatting.

use {
    crate::CliError,
    anyhow::{Context as _, Result},
    console::style,
    periconf::{BoardKind, NativePortEnumerator, PortEnumerator, format_as_typed, mac},
};

/// List serial ports.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).context("Failed to encode port list")?
        );
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports:")
            .for_stderr()
            .bold()
            .underlined()
    );

    if ports.is_empty() {
        eprintln!("  {}", style("(none)").for_stderr().dim());
        return Ok(());
    }

    for port in &ports {
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).for_stderr().dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{vid_pid}{product}",
            style("•").for_stderr().green(),
            style(&port.name)
                .for_stderr()
                .cyan(),
        );
    }
    Ok(())
}

/// List the supported boards and what each accepts.
pub(crate) fn cmd_boards() {
    for kind in BoardKind::ALL {
        let profile = kind.profile();
        println!("{} - {}", style(kind.name()).bold(), profile.title);

        let mut features = Vec::new();
        if profile.uses_modes {
            features.push("label/DUT modes");
        }
        if profile.mac_registry {
            features.push("MAC registry");
        }
        if profile.diagnostics {
            features.push("debug mode");
        }
        if profile.settings_query {
            features.push("settings query");
        }
        if !features.is_empty() {
            println!("  {}", features.join(", "));
        }
        if let Some(image) = profile.default_firmware {
            println!("  firmware: {image}");
        }

        for setting in profile.settings {
            println!(
                "  {:<18} {:<14} {}",
                setting.key,
                setting.command,
                style(setting.kind.describe()).dim()
            );
        }
        println!();
    }
}

/// Format `text` as it would be typed into a MAC field and validate it.
///
/// The formatted text always goes to stdout; an invalid result is a usage error.
pub(crate) fn cmd_mac(text: &str) -> Result<()> {
    let formatted = format_as_typed(text.trim());
    println!("{formatted}");

    if mac::validate(&formatted) {
        Ok(())
    } else {
        Err(CliError::Usage(format!(
            "'{formatted}' is not a valid MAC address (expected AA:BB:CC:DD:EE:FF)"
        ))
        .into())
    }
}
