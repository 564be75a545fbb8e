//! Serial monitor command implementation.
//!
//! Prints everything the board sends until Ctrl+C. Settings are requested once
//! after connecting on boards that answer `getsettings`.

use {
    super::{Context, DeviceAction, device::dry_run, interrupt_flag},
    crate::output::ConsoleSink,
    anyhow::{Context as _, Result},
    console::style,
    log::{debug, info},
    periconf::{DeviceSession, SerialConfig},
    std::{
        io::{self, Write as _},
        sync::atomic::Ordering,
        thread,
    },
};

/// Run the serial monitor.
pub(crate) fn cmd_monitor(ctx: &mut Context, query_settings: bool) -> Result<()> {
    let query_settings = query_settings && ctx.profile.settings_query;

    if ctx.dry_run {
        let mut actions = Vec::new();
        if query_settings {
            actions.push(DeviceAction::GetSettings);
        }
        print!("{}", dry_run(ctx, &actions)?);
        io::stdout().flush()?;
        return Ok(());
    }

    let port = ctx.resolve_port()?;
    let stop = interrupt_flag()?;

    let mut session = DeviceSession::new(ctx.profile, ConsoleSink::new(ctx.quiet));
    session.set_show_binary(ctx.config.show_binary());
    session
        .open(&SerialConfig::new(&port))
        .with_context(|| format!("Failed to open {port}"))?;

    if query_settings {
        session.get_settings()?;
    } else {
        debug!("Skipping settings query");
    }

    if !ctx.quiet {
        eprintln!(
            "{}",
            style("Press Ctrl+C to exit")
                .for_stderr()
                .dim()
        );
    }

    let interval = ctx
        .config
        .poll_interval();
    while !stop.load(Ordering::SeqCst) {
        session.poll_incoming()?;
        thread::sleep(interval);
    }

    info!("Monitor stopped");
    session.close();
    Ok(())
}
