//! One-shot device commands.
//!
//! Each command opens a session, writes its command line(s), listens for the
//! replies for the configured window and disconnects. In dry-run mode the
//! session is attached to a [`MemoryPort`] and the written bytes are printed.

use {
    super::Context,
    crate::output::ConsoleSink,
    anyhow::{Context as _, Result},
    log::debug,
    periconf::{
        ByteNumber, DeviceMode, DeviceSession, MemoryPort, OutputSink, SerialConfig,
    },
    std::{
        io::{self, Write as _},
        thread,
        time::{Duration, Instant},
    },
};

/// Port name shown for dry-run sessions.
pub(crate) const DRY_RUN_PORT: &str = "dry-run";

/// What a one-shot command asks the board to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DeviceAction {
    SetMode(DeviceMode),
    AddLabelMac(String),
    AddDutMac {
        mac: String,
        position: u8,
        byte_number: ByteNumber,
    },
    DeleteAll,
    DeleteAt(String),
    ListMacs(DeviceMode),
    GetSettings,
    Set {
        key: String,
        value: String,
    },
    DebugMode(bool),
}

impl DeviceAction {
    /// Issue the action on a connected session.
    pub(crate) fn apply<S: OutputSink>(&self, session: &mut DeviceSession<S>) -> periconf::Result<()> {
        match self {
            Self::SetMode(mode) => session.set_mode(*mode),
            Self::AddLabelMac(mac) => session.add_label_mac(mac),
            Self::AddDutMac {
                mac,
                position,
                byte_number,
            } => session.add_dut_mac(mac, *position, *byte_number),
            Self::DeleteAll => session.delete_all_macs(),
            Self::DeleteAt(position) => session.delete_mac_at_position(position),
            Self::ListMacs(mode) => session.list_macs(*mode),
            Self::GetSettings => session.get_settings(),
            Self::Set { key, value } => session.set_setting(key, value),
            Self::DebugMode(enabled) => session.set_debug_mode(*enabled),
        }
    }
}

/// Run a one-shot device command.
pub(crate) fn cmd_device(ctx: &mut Context, action: &DeviceAction) -> Result<()> {
    if ctx.dry_run {
        let written = dry_run(ctx, std::slice::from_ref(action))?;
        print!("{written}");
        io::stdout().flush()?;
        return Ok(());
    }

    let port = ctx.resolve_port()?;
    let mut session = DeviceSession::new(ctx.profile, ConsoleSink::new(ctx.quiet));
    session.set_show_binary(ctx.config.show_binary());
    session
        .open(&SerialConfig::new(&port))
        .with_context(|| format!("Failed to open {port}"))?;

    action.apply(&mut session)?;
    listen(
        &mut session,
        ctx.config
            .listen_window(),
        ctx.config
            .poll_interval(),
    )?;
    session.close();
    Ok(())
}

/// Apply `actions` to an in-memory port and return the text written.
///
/// Nothing is returned when any action fails, so a rejected command never
/// shows up as output.
pub(crate) fn dry_run(ctx: &Context, actions: &[DeviceAction]) -> Result<String> {
    let (port, handle) = MemoryPort::new(DRY_RUN_PORT);
    let mut session = DeviceSession::new(ctx.profile, ConsoleSink::new(ctx.quiet));
    session.attach(Box::new(port))?;
    for action in actions {
        action.apply(&mut session)?;
    }
    session.close();
    Ok(handle.written_text())
}

/// Poll for replies until `window` has elapsed.
///
/// Replies are printed by the session's sink as they arrive. A window too
/// large to represent as a deadline never expires.
pub(crate) fn listen<S: OutputSink>(
    session: &mut DeviceSession<S>,
    window: Duration,
    interval: Duration,
) -> Result<()> {
    let deadline = Instant::now().checked_add(window);
    loop {
        let received = session.poll_incoming()?;
        if !received.is_empty() {
            debug!("Received {} item(s)", received.len());
        }
        let pause = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(());
                }
                interval.min(remaining)
            },
            None => interval,
        };
        thread::sleep(pause);
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::config::Config,
        periconf::{BoardKind, Incoming, MemoryPort, OutputLine},
    };

    fn ctx(kind: BoardKind) -> Context {
        let mut ctx = Context::new(kind.profile(), Config::default(), None);
        ctx.quiet = true;
        ctx.dry_run = true;
        ctx
    }

    #[test]
    fn test_dry_run_label_mac() {
        let written = dry_run(
            &ctx(BoardKind::BleBase),
            &[DeviceAction::AddLabelMac("aa:bb:cc:dd:ee:ff".into())],
        )
        .unwrap();
        assert_eq!(written, "setmode 0\nnewmac aa:bb:cc:dd:ee:ff\n");
    }

    #[test]
    fn test_dry_run_dut_mac() {
        let written = dry_run(
            &ctx(BoardKind::BleBase),
            &[DeviceAction::AddDutMac {
                mac: "AA:BB:CC:DD:EE:01".into(),
                position: 2,
                byte_number: ByteNumber::Custom(4),
            }],
        )
        .unwrap();
        assert_eq!(written, "setmode 1\nnewdut AA:BB:CC:DD:EE:01 2 4\n");
    }

    #[test]
    fn test_dry_run_rejected_value_is_error() {
        let err = dry_run(
            &ctx(BoardKind::BleBase),
            &[DeviceAction::AddLabelMac("aa:bb".into())],
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<periconf::Error>(),
            Some(periconf::Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_dry_run_board_without_modes() {
        let written = dry_run(
            &ctx(BoardKind::CurrentSensor),
            &[DeviceAction::Set {
                key: "device-id".into(),
                value: "42".into(),
            }],
        )
        .unwrap();
        assert_eq!(written, "setdeviceid 42\n");
    }

    #[test]
    fn test_dry_run_unsupported_command() {
        let err = dry_run(&ctx(BoardKind::FuelIndicator), &[DeviceAction::GetSettings]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<periconf::Error>(),
            Some(periconf::Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_listen_collects_replies() {
        let (port, handle) = MemoryPort::new("mem");
        let mut session = DeviceSession::new(BoardKind::BleBase.profile(), Vec::new());
        session
            .attach(Box::new(port))
            .unwrap();
        handle.push_incoming(b"hello\n");

        listen(&mut session, Duration::ZERO, Duration::from_millis(1)).unwrap();

        assert!(
            session
                .sink()
                .contains(&OutputLine::from(Incoming::Text("hello".into())))
        );
    }

    #[test]
    fn test_listen_stops_on_transport_error() {
        let (port, handle) = MemoryPort::new("mem");
        let mut session = DeviceSession::new(BoardKind::BleBase.profile(), Vec::new());
        session
            .attach(Box::new(port))
            .unwrap();
        handle.fail_reads(true);

        assert!(listen(&mut session, Duration::from_secs(5), Duration::from_millis(1)).is_err());
        assert!(!session.is_connected());
    }

    #[test]
    fn test_listen_accepts_unbounded_window() {
        let (port, handle) = MemoryPort::new("mem");
        let mut session = DeviceSession::new(BoardKind::BleBase.profile(), Vec::new());
        session
            .attach(Box::new(port))
            .unwrap();
        handle.fail_reads(true);

        let window = Duration::from_millis(u64::MAX);
        assert!(listen(&mut session, window, Duration::from_millis(1)).is_err());
    }
}
