//! Line-protocol session with one board.
//!
//! A [`DeviceSession`] owns the transport, tracks the device-side mode and
//! turns typed requests into newline-terminated ASCII commands:
//!
//! ```text
//! Disconnected --open/attach--> Connected --close / I/O error--> Disconnected
//! ```
//!
//! Every command requires a connected session and fails with
//! [`Error::NotConnected`] otherwise, without touching the transport. Values are
//! validated before anything is written. A failed write or read drops the
//! transport; there is no automatic reconnect or resend.

use {
    crate::{
        board::{BoardProfile, ByteNumber, DUT_SLOTS},
        classify::{BinaryPreview, Response, classify},
        error::{Error, Result},
        mac::MacAddress,
        port::Port,
        sink::{NullSink, OutputLine, OutputSink},
        text::take_complete,
    },
    log::{debug, info, trace, warn},
    std::{
        fmt,
        io::{self, Read},
    },
};

#[cfg(feature = "native")]
use crate::port::{NativePort, SerialConfig};

/// Upper bound on the bytes drained by a single poll.
const MAX_POLL_BYTES: usize = 4096;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Transport open and buffers cleared.
    Connected,
}

/// Device-side operating mode of the BLE base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceMode {
    /// Label (beacon) mode, `setmode 0`.
    #[default]
    Label,
    /// DUT (fuel sensor) mode, `setmode 1`.
    Dut,
}

impl DeviceMode {
    /// Value sent with `setmode`.
    #[must_use]
    pub fn value(self) -> u8 {
        match self {
            Self::Label => 0,
            Self::Dut => 1,
        }
    }

    /// Parse `label`/`dut` or `0`/`1`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name
            .trim()
            .to_lowercase()
            .as_str()
        {
            "label" | "labels" | "0" => Some(Self::Label),
            "dut" | "1" => Some(Self::Dut),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label => write!(f, "label"),
            Self::Dut => write!(f, "dut"),
        }
    }
}

/// Something received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Generic text line.
    Text(String),
    /// Settings-report line.
    Setting(String),
    /// Binary diagnostic chunk.
    Binary(BinaryPreview),
}

impl From<Incoming> for OutputLine {
    fn from(incoming: Incoming) -> Self {
        match incoming {
            Incoming::Text(line) => Self::Text(line),
            Incoming::Setting(line) => Self::Setting(line),
            Incoming::Binary(preview) => Self::Binary(preview),
        }
    }
}

/// Session with one board over one transport.
pub struct DeviceSession<S: OutputSink = NullSink> {
    port: Option<Box<dyn Port>>,
    profile: &'static BoardProfile,
    sink: S,
    device_mode: DeviceMode,
    last_command: Option<String>,
    show_binary: bool,
    /// Start of a character whose remaining bytes have not arrived yet.
    pending: Vec<u8>,
}

impl<S: OutputSink> DeviceSession<S> {
    /// Create a disconnected session for `profile`, reporting to `sink`.
    pub fn new(profile: &'static BoardProfile, sink: S) -> Self {
        Self {
            port: None,
            profile,
            sink,
            device_mode: DeviceMode::default(),
            last_command: None,
            show_binary: false,
            pending: Vec::new(),
        }
    }

    /// Open a serial port with the line-protocol parameters and attach it.
    #[cfg(feature = "native")]
    pub fn open(&mut self, config: &SerialConfig) -> Result<()> {
        let port = NativePort::open(config).map_err(|e| {
            let err = Error::Connection {
                port: config
                    .port_name
                    .clone(),
                reason: e.to_string(),
            };
            self.sink
                .emit(OutputLine::Error(err.to_string()));
            err
        })?;
        self.attach(Box::new(port))
    }

    /// Take ownership of an already open transport.
    ///
    /// Pending buffers are discarded first; if that fails the transport is
    /// closed again and the session stays disconnected.
    pub fn attach(&mut self, mut port: Box<dyn Port>) -> Result<()> {
        self.close();

        let name = port
            .name()
            .to_string();
        if let Err(e) = port.clear_buffers() {
            let _ = port.close();
            let err = Error::Connection {
                port: name,
                reason: e.to_string(),
            };
            self.sink
                .emit(OutputLine::Error(err.to_string()));
            return Err(err);
        }

        info!("Connected to {name} ({})", self.profile.title);
        self.sink
            .emit(OutputLine::Status(format!("Connected to {name}")));
        self.port = Some(port);
        self.device_mode = DeviceMode::default();
        self.last_command = None;
        Ok(())
    }

    /// Release the transport. Does nothing when already disconnected.
    pub fn close(&mut self) {
        if let Some(mut port) = self
            .port
            .take()
        {
            let name = port
                .name()
                .to_string();
            if let Err(e) = port.close() {
                warn!("Error closing {name}: {e}");
            }
            info!("Disconnected from {name}");
            self.sink
                .emit(OutputLine::Status(format!("Disconnected from {name}")));
        }
        self.last_command = None;
        self.pending.clear();
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.port.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Whether a transport is attached.
    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// Name of the attached port.
    pub fn port_name(&self) -> Option<&str> {
        self.port
            .as_deref()
            .map(Port::name)
    }

    /// Board profile this session drives.
    pub fn profile(&self) -> &'static BoardProfile {
        self.profile
    }

    /// Mode most recently asserted on the device.
    pub fn device_mode(&self) -> DeviceMode {
        self.device_mode
    }

    /// Whether binary chunks are forwarded to the sink.
    pub fn set_show_binary(&mut self, show: bool) {
        self.show_binary = show;
    }

    /// The output sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The output sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the session and return its sink. The transport is closed.
    pub fn into_sink(mut self) -> S {
        self.close();
        self.sink
    }

    /// Write `setmode <mode>`.
    pub fn set_mode(&mut self, mode: DeviceMode) -> Result<()> {
        self.ensure_connected()?;
        if !self.profile.uses_modes {
            return Err(self.unsupported("setmode"));
        }
        self.write_mode(mode)
    }

    /// Register a label MAC (`newmac`).
    pub fn add_label_mac(&mut self, address: &str) -> Result<()> {
        self.ensure_connected()?;
        self.require(self.profile.mac_registry, "newmac")?;
        let mac = MacAddress::parse(address)?;
        self.assert_mode(DeviceMode::Label)?;
        self.send(&format!("newmac {mac}"))
    }

    /// Register a DUT MAC in slot `position` (`newdut`).
    pub fn add_dut_mac(
        &mut self,
        address: &str,
        position: u8,
        byte_number: ByteNumber,
    ) -> Result<()> {
        self.ensure_connected()?;
        self.require(self.profile.mac_registry, "newdut")?;
        let mac = MacAddress::parse(address)?;
        if !(1..=DUT_SLOTS).contains(&position) {
            return Err(Error::InvalidFormat(format!(
                "DUT position must be 1..={DUT_SLOTS}, got {position}"
            )));
        }
        self.assert_mode(DeviceMode::Dut)?;
        self.send(&format!("newdut {mac} {position} {}", byte_number.value()))
    }

    /// Clear the MAC registry (`deleteall`).
    pub fn delete_all_macs(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.require(self.profile.mac_registry, "deleteall")?;
        self.assert_mode(DeviceMode::Label)?;
        self.send("deleteall")
    }

    /// Delete one registry entry (`deleteat`).
    ///
    /// `position` is free text and must be a non-negative integer. Label mode
    /// is written before the command every time.
    pub fn delete_mac_at_position(&mut self, position: &str) -> Result<()> {
        self.ensure_connected()?;
        self.require(self.profile.mac_registry, "deleteat")?;
        let position = position.trim();
        if position.is_empty()
            || !position
                .bytes()
                .all(|b| b.is_ascii_digit())
        {
            return Err(Error::InvalidFormat(format!(
                "position must be a non-negative integer, got '{position}'"
            )));
        }
        let position: u64 = position
            .parse()
            .map_err(|_| Error::InvalidFormat(format!("position out of range: {position}")))?;

        if self.profile.uses_modes {
            self.write_mode(DeviceMode::Label)?;
        }
        self.send(&format!("deleteat {position}"))
    }

    /// Request the MAC list (`getmacs`) for the registry shown in `mode`.
    pub fn list_macs(&mut self, mode: DeviceMode) -> Result<()> {
        self.ensure_connected()?;
        self.require(self.profile.mac_registry, "getmacs")?;
        self.assert_mode(mode)?;
        self.send("getmacs")
    }

    /// Request the settings dump (`getsettings`).
    pub fn get_settings(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.require(self.profile.settings_query, "getsettings")?;
        self.assert_mode(DeviceMode::Label)?;
        self.send("getsettings")
    }

    /// Validate and write one setting by key.
    pub fn set_setting(&mut self, key: &str, value: &str) -> Result<()> {
        self.ensure_connected()?;
        let spec = self
            .profile
            .setting(key)
            .ok_or_else(|| self.unsupported(key))?;
        let line = spec.command_line(value)?;
        if let Some(mode) = spec.mode {
            self.assert_mode(mode)?;
        }
        if spec
            .kind
            .is_secret()
        {
            let echo = format!("{} ********", spec.command);
            self.send_echoed(&line, &echo)
        } else {
            self.send(&line)
        }
    }

    /// `setupdate`
    pub fn set_update_interval(&mut self, value: &str) -> Result<()> {
        self.set_setting("update-interval", value)
    }

    /// `setbtime`
    pub fn set_hold_time(&mut self, value: &str) -> Result<()> {
        self.set_setting("hold-time", value)
    }

    /// `setbcount`
    pub fn set_hold_count(&mut self, value: &str) -> Result<()> {
        self.set_setting("hold-count", value)
    }

    /// `setbthreshold`
    pub fn set_rssi_threshold(&mut self, value: &str) -> Result<()> {
        self.set_setting("rssi-threshold", value)
    }

    /// `setnetaddr`
    pub fn set_network_address(&mut self, value: &str) -> Result<()> {
        self.set_setting("network-address", value)
    }

    /// `setdeviceid`
    pub fn set_device_id(&mut self, value: &str) -> Result<()> {
        self.set_setting("device-id", value)
    }

    /// `setclientid`
    pub fn set_client_id(&mut self, value: &str) -> Result<()> {
        self.set_setting("client-id", value)
    }

    /// `setssid`
    pub fn set_ssid(&mut self, value: &str) -> Result<()> {
        self.set_setting("ssid", value)
    }

    /// `setpassword`
    pub fn set_password(&mut self, value: &str) -> Result<()> {
        self.set_setting("password", value)
    }

    /// `seturl`
    pub fn set_url(&mut self, value: &str) -> Result<()> {
        self.set_setting("url", value)
    }

    /// `setblemac`
    pub fn set_ble_mac(&mut self, value: &str) -> Result<()> {
        self.set_setting("ble-mac", value)
    }

    /// Fuel indicator `reset <litres>`.
    pub fn set_litres(&mut self, value: &str) -> Result<()> {
        self.set_setting("litres", value)
    }

    /// Fuel indicator `set <impulses>`.
    pub fn set_impulses(&mut self, value: &str) -> Result<()> {
        self.set_setting("impulses", value)
    }

    /// Toggle the RS-485 diagnostic echo (`debugMode`).
    pub fn set_debug_mode(&mut self, enabled: bool) -> Result<()> {
        self.ensure_connected()?;
        self.require(self.profile.diagnostics, "debugMode")?;
        self.send(&format!("debugMode {}", u8::from(enabled)))
    }

    /// Drain whatever the device has sent so far.
    ///
    /// Never waits for data: only the bytes already buffered are read. A
    /// character cut off at the end of the read is held back until the next
    /// poll. Text is split into lines and settings reports are tagged. Every item is also
    /// emitted to the sink (binary chunks only when enabled with
    /// [`set_show_binary`](Self::set_show_binary)).
    pub fn poll_incoming(&mut self) -> Result<Vec<Incoming>> {
        self.ensure_connected()?;
        match self.drain_available() {
            Ok(chunk) => {
                if !chunk.is_empty() {
                    trace!("Received {} bytes", chunk.len());
                }
                self.pending
                    .extend_from_slice(&chunk);
            },
            Err(e) => return Err(self.fail_transport(&e)),
        }
        let chunk = take_complete(&mut self.pending);
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        let items = match classify(&chunk) {
            Response::TextLine(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| {
                    if self
                        .profile
                        .is_report_line(line)
                    {
                        Incoming::Setting(line.to_string())
                    } else {
                        Incoming::Text(line.to_string())
                    }
                })
                .collect::<Vec<_>>(),
            Response::BinaryPreview(preview) => {
                debug!("Binary chunk: {preview}");
                vec![Incoming::Binary(preview)]
            },
        };

        for item in &items {
            if matches!(item, Incoming::Binary(_)) && !self.show_binary {
                continue;
            }
            self.sink
                .emit(item.clone().into());
        }
        Ok(items)
    }

    fn drain_available(&mut self) -> io::Result<Vec<u8>> {
        let Some(port) = self
            .port
            .as_mut()
        else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "not connected",
            ));
        };

        let mut chunk = Vec::new();
        while chunk.len() < MAX_POLL_BYTES {
            let available = port
                .bytes_to_read()
                .map_err(|e| io::Error::other(e.to_string()))?;
            if available == 0 {
                break;
            }
            let mut buf = vec![0u8; available.min(MAX_POLL_BYTES - chunk.len())];
            match port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => chunk.extend_from_slice(&buf[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    break;
                },
                Err(e) => return Err(e),
            }
        }
        Ok(chunk)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.port.is_some() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn require(&self, supported: bool, command: &str) -> Result<()> {
        if supported {
            Ok(())
        } else {
            Err(self.unsupported(command))
        }
    }

    fn unsupported(&self, what: &str) -> Error {
        Error::Unsupported(format!("{} does not support {what}", self.profile.title))
    }

    /// Put the device in `mode` before a mode-sensitive command, unless the
    /// previous command already did exactly that.
    fn assert_mode(&mut self, mode: DeviceMode) -> Result<()> {
        if !self.profile.uses_modes {
            return Ok(());
        }
        let setmode = format!("setmode {}", mode.value());
        if self.last_command.as_deref() == Some(setmode.as_str()) {
            return Ok(());
        }
        self.write_mode(mode)
    }

    fn write_mode(&mut self, mode: DeviceMode) -> Result<()> {
        self.send(&format!("setmode {}", mode.value()))?;
        self.device_mode = mode;
        Ok(())
    }

    fn send(&mut self, command: &str) -> Result<()> {
        self.send_echoed(command, command)
    }

    /// Write `command`, showing `echo` in the sink and the log instead.
    fn send_echoed(&mut self, command: &str, echo: &str) -> Result<()> {
        let Some(port) = self
            .port
            .as_mut()
        else {
            return Err(Error::NotConnected);
        };

        let line = format!("{command}\n");
        if let Err(e) = port.write_all_bytes(line.as_bytes()) {
            return Err(self.fail_transport(&e));
        }

        debug!("Sent: {echo}");
        self.sink
            .emit(OutputLine::Sent(echo.to_string()));
        self.last_command = Some(command.to_string());
        Ok(())
    }

    fn fail_transport(&mut self, cause: &dyn fmt::Display) -> Error {
        let name = self
            .port_name()
            .unwrap_or("port")
            .to_string();
        warn!("I/O error on {name}: {cause}");
        self.sink
            .emit(OutputLine::Error(format!("{name}: {cause}")));
        self.close();
        Error::Transport(format!("{name}: {cause}"))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            board::{BoardKind, DutPreset},
            port::{MemoryPort, MemoryPortHandle},
        },
    };

    fn connected(kind: BoardKind) -> (DeviceSession<Vec<OutputLine>>, MemoryPortHandle) {
        let (port, handle) = MemoryPort::new("mem0");
        let mut session = DeviceSession::new(kind.profile(), Vec::new());
        session
            .attach(Box::new(port))
            .unwrap();
        (session, handle)
    }

    #[test]
    fn test_set_mode_then_label_mac_exact_bytes() {
        let (mut session, handle) = connected(BoardKind::BleBase);
        session
            .set_mode(DeviceMode::Label)
            .unwrap();
        session
            .add_label_mac("aa:bb:cc:dd:ee:ff")
            .unwrap();
        assert_eq!(
            handle.written_text(),
            "setmode 0\nnewmac aa:bb:cc:dd:ee:ff\n"
        );
    }

    #[test]
    fn test_disconnected_never_writes() {
        let (port, handle) = MemoryPort::new("mem0");
        let mut session = DeviceSession::new(BoardKind::BleBase.profile(), Vec::new());
        assert_eq!(session.state(), ConnectionState::Disconnected);

        assert!(matches!(
            session.add_label_mac("aa:bb:cc:dd:ee:ff"),
            Err(Error::NotConnected)
        ));
        assert!(matches!(session.get_settings(), Err(Error::NotConnected)));
        assert!(matches!(
            session.set_mode(DeviceMode::Dut),
            Err(Error::NotConnected)
        ));
        assert!(matches!(session.poll_incoming(), Err(Error::NotConnected)));
        drop(port);
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_attach_clears_buffers() {
        let (port, handle) = MemoryPort::new("mem0");
        handle.push_incoming(b"boot noise");
        let mut session = DeviceSession::new(BoardKind::BleBase.profile(), Vec::new());
        session
            .attach(Box::new(port))
            .unwrap();
        assert_eq!(handle.clear_count(), 1);
        assert!(session.is_connected());
        assert_eq!(session.port_name(), Some("mem0"));
        assert!(session.poll_incoming().unwrap().is_empty());
    }

    #[test]
    fn test_mode_asserted_before_mode_sensitive_commands() {
        let (mut session, handle) = connected(BoardKind::BleBase);
        session
            .add_label_mac("AA:BB:CC:DD:EE:FF")
            .unwrap();
        session
            .add_dut_mac("11:22:33:44:55:66", 2, ByteNumber::Preset(DutPreset::Escort))
            .unwrap();
        session
            .list_macs(DeviceMode::Dut)
            .unwrap();
        session
            .delete_all_macs()
            .unwrap();
        session
            .set_update_interval("1000")
            .unwrap();

        assert_eq!(
            handle.written_text(),
            "setmode 0\nnewmac AA:BB:CC:DD:EE:FF\n\
             setmode 1\nnewdut 11:22:33:44:55:66 2 8\n\
             setmode 1\ngetmacs\n\
             setmode 0\ndeleteall\n\
             setmode 0\nsetupdate 1000\n"
        );
        assert_eq!(session.device_mode(), DeviceMode::Label);
    }

    #[test]
    fn test_delete_at_always_writes_label_mode() {
        let (mut session, handle) = connected(BoardKind::BleBase);
        session
            .set_mode(DeviceMode::Label)
            .unwrap();
        session
            .delete_mac_at_position(" 3 ")
            .unwrap();
        assert_eq!(
            handle.written_text(),
            "setmode 0\nsetmode 0\ndeleteat 3\n"
        );
    }

    #[test]
    fn test_invalid_input_writes_nothing() {
        let (mut session, handle) = connected(BoardKind::BleBase);
        assert!(matches!(
            session.add_label_mac("aa:bb:cc:dd:ee"),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            session.add_dut_mac("aa:bb:cc:dd:ee:ff", 7, ByteNumber::Custom(4)),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            session.add_dut_mac("aa:bb:cc:dd:ee:ff", 0, ByteNumber::Custom(4)),
            Err(Error::InvalidFormat(_))
        ));
        for bad in ["-1", "x", "", "1.5"] {
            assert!(matches!(
                session.delete_mac_at_position(bad),
                Err(Error::InvalidFormat(_))
            ));
        }
        assert!(matches!(
            session.set_rssi_threshold("-200"),
            Err(Error::InvalidFormat(_))
        ));
        assert!(handle.written().is_empty());
        assert!(session.is_connected());
    }

    #[test]
    fn test_unsupported_commands() {
        let (mut session, handle) = connected(BoardKind::CurrentSensor);
        assert!(matches!(
            session.set_mode(DeviceMode::Label),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            session.add_label_mac("aa:bb:cc:dd:ee:ff"),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            session.set_debug_mode(true),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            session.set_update_interval("10"),
            Err(Error::Unsupported(_))
        ));
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_boards_without_modes_skip_setmode() {
        let (mut session, handle) = connected(BoardKind::CurrentSensor);
        session
            .get_settings()
            .unwrap();
        session
            .set_device_id("42")
            .unwrap();
        session
            .set_ssid(" office ")
            .unwrap();
        session
            .set_url("http://example.org/ingest")
            .unwrap();
        assert_eq!(
            handle.written_text(),
            "getsettings\nsetdeviceid 42\nsetssid office\nseturl http://example.org/ingest\n"
        );
    }

    #[test]
    fn test_fuel_indicator_commands() {
        let (mut session, handle) = connected(BoardKind::FuelIndicator);
        session
            .set_litres("60")
            .unwrap();
        session
            .set_impulses(crate::board::DEFAULT_IMPULSES)
            .unwrap();
        assert!(matches!(session.get_settings(), Err(Error::Unsupported(_))));
        assert_eq!(handle.written_text(), "reset 60\nset 7.184\n");
    }

    #[test]
    fn test_debug_mode() {
        let (mut session, handle) = connected(BoardKind::BleBase);
        session
            .set_debug_mode(true)
            .unwrap();
        session
            .set_debug_mode(false)
            .unwrap();
        assert_eq!(handle.written_text(), "debugMode 1\ndebugMode 0\n");
    }

    #[test]
    fn test_sent_commands_reach_sink() {
        let (mut session, _handle) = connected(BoardKind::BleBase);
        session
            .get_settings()
            .unwrap();
        let sink = session.into_sink();
        assert_eq!(
            sink,
            vec![
                OutputLine::Status("Connected to mem0".into()),
                OutputLine::Sent("setmode 0".into()),
                OutputLine::Sent("getsettings".into()),
                OutputLine::Status("Disconnected from mem0".into()),
            ]
        );
    }

    #[test]
    fn test_poll_splits_and_tags_lines() {
        let (mut session, handle) = connected(BoardKind::BleBase);
        handle.push_incoming(
            "Сетевой адрес: 5\r\nРежим работы: метки\r\nMAC 1: AA:BB:CC:DD:EE:FF\r\n".as_bytes(),
        );
        let items = session
            .poll_incoming()
            .unwrap();
        assert_eq!(
            items,
            vec![
                Incoming::Setting("Сетевой адрес: 5".into()),
                Incoming::Setting("Режим работы: метки".into()),
                Incoming::Text("MAC 1: AA:BB:CC:DD:EE:FF".into()),
            ]
        );
        assert!(session.poll_incoming().unwrap().is_empty());
    }

    #[test]
    fn test_poll_carries_character_split_between_reads() {
        let (mut session, handle) = connected(BoardKind::BleBase);
        let report = "Сетевой адрес: 5\r\n".as_bytes();

        // Cut inside the second character
        handle.push_incoming(&report[..3]);
        let first = session
            .poll_incoming()
            .unwrap();
        handle.push_incoming(&report[3..]);
        let second = session
            .poll_incoming()
            .unwrap();
        assert_eq!(first, vec![Incoming::Text("С".into())]);
        assert_eq!(second, vec![Incoming::Text("етевой адрес: 5".into())]);

        // Cut inside the first character: nothing is shown until it completes
        handle.push_incoming(&report[..1]);
        assert!(session.poll_incoming().unwrap().is_empty());
        handle.push_incoming(&report[1..]);
        assert_eq!(
            session
                .poll_incoming()
                .unwrap(),
            vec![Incoming::Setting("Сетевой адрес: 5".into())]
        );
    }

    #[test]
    fn test_poll_binary_only_forwarded_when_enabled() {
        let (mut session, handle) = connected(BoardKind::BleBase);
        handle.push_incoming(&[0x00, 0x01, 0x02, 0x03, 0xFF]);
        let items = session
            .poll_incoming()
            .unwrap();
        assert!(matches!(items.as_slice(), [Incoming::Binary(p)] if p.byte_count == 5));
        assert!(
            !session
                .sink()
                .iter()
                .any(|l| matches!(l, OutputLine::Binary(_)))
        );

        session.set_show_binary(true);
        handle.push_incoming(&[0x00, 0x01]);
        session
            .poll_incoming()
            .unwrap();
        assert!(
            session
                .sink()
                .iter()
                .any(|l| matches!(l, OutputLine::Binary(_)))
        );
    }

    #[test]
    fn test_read_failure_disconnects() {
        let (mut session, handle) = connected(BoardKind::BleBase);
        handle.fail_reads(true);
        assert!(matches!(session.poll_incoming(), Err(Error::Transport(_))));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(handle.is_closed());
        assert!(matches!(session.get_settings(), Err(Error::NotConnected)));
    }

    #[test]
    fn test_write_failure_disconnects() {
        let (mut session, handle) = connected(BoardKind::BleBase);
        handle.fail_writes(true);
        let err = session
            .set_mode(DeviceMode::Dut)
            .unwrap_err();
        assert!(err.is_transport());
        assert!(!session.is_connected());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut session, handle) = connected(BoardKind::BleBase);
        session.close();
        session.close();
        assert!(handle.is_closed());
        let disconnects = session
            .sink()
            .iter()
            .filter(|l| matches!(l, OutputLine::Status(s) if s.starts_with("Disconnected")))
            .count();
        assert_eq!(disconnects, 1);
    }

    #[test]
    fn test_device_mode_names() {
        assert_eq!(DeviceMode::from_name("label"), Some(DeviceMode::Label));
        assert_eq!(DeviceMode::from_name("DUT"), Some(DeviceMode::Dut));
        assert_eq!(DeviceMode::from_name("1"), Some(DeviceMode::Dut));
        assert_eq!(DeviceMode::from_name("tank"), None);
        assert_eq!(DeviceMode::Dut.value(), 1);
    }

    #[test]
    fn test_password_is_masked_in_echo() {
        let (mut session, handle) = connected(BoardKind::CurrentSensor);
        session
            .set_password("hunter2")
            .unwrap();

        assert_eq!(handle.written_text(), "setpassword hunter2\n");
        let sent: Vec<&OutputLine> = session
            .sink()
            .iter()
            .filter(|l| matches!(l, OutputLine::Sent(_)))
            .collect();
        assert_eq!(sent, [&OutputLine::Sent("setpassword ********".into())]);
    }
}
