//! Board profiles.
//!
//! Every supported board speaks the same line protocol but offers a different
//! set of commands. A [`BoardProfile`] is a static table describing what one
//! board accepts, so a single [`DeviceSession`](crate::session::DeviceSession)
//! can drive all of them.

use {
    crate::{
        error::{Error, Result},
        mac::MacAddress,
        session::DeviceMode,
    },
    std::fmt,
};

/// Byte number reported by the Escort fuel-level sensor.
pub const ESCORT_BYTE_NUMBER: u32 = 8;

/// Impulses-per-litre preset of the fuel indicator.
pub const DEFAULT_IMPULSES: &str = "7.184";

/// Number of DUT slots on the BLE base.
pub const DUT_SLOTS: u8 = 6;

/// Supported board kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoardKind {
    /// BLE beacon base station.
    #[default]
    BleBase,
    /// Fuel-level indicator.
    FuelIndicator,
    /// Current sensor.
    CurrentSensor,
    /// Temperature sensor reporting over Wi-Fi.
    TemperatureSensor,
    /// Temperature sensor paired with a BLE peer.
    TemperatureSensorBle,
    /// Attendance reader.
    AttendanceReader,
}

impl BoardKind {
    /// All board kinds, in display order.
    pub const ALL: [Self; 6] = [
        Self::BleBase,
        Self::FuelIndicator,
        Self::CurrentSensor,
        Self::TemperatureSensor,
        Self::TemperatureSensorBle,
        Self::AttendanceReader,
    ];

    /// Command-line name of the board.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::BleBase => "ble-base",
            Self::FuelIndicator => "fuel-indicator",
            Self::CurrentSensor => "current-sensor",
            Self::TemperatureSensor => "temperature-sensor",
            Self::TemperatureSensorBle => "temperature-sensor-ble",
            Self::AttendanceReader => "attendance-reader",
        }
    }

    /// Look a board up by name. Underscores are accepted in place of dashes.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name
            .trim()
            .to_lowercase()
            .replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
    }

    /// The command table for this board.
    #[must_use]
    pub fn profile(self) -> &'static BoardProfile {
        match self {
            Self::BleBase => &BLE_BASE,
            Self::FuelIndicator => &FUEL_INDICATOR,
            Self::CurrentSensor => &CURRENT_SENSOR,
            Self::TemperatureSensor => &TEMPERATURE_SENSOR,
            Self::TemperatureSensorBle => &TEMPERATURE_SENSOR_BLE,
            Self::AttendanceReader => &ATTENDANCE_READER,
        }
    }
}

impl fmt::Display for BoardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for BoardKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| Error::Config(format!("unknown board: {s}")))
    }
}

/// What a board accepts.
#[derive(Debug)]
pub struct BoardProfile {
    /// Board kind.
    pub kind: BoardKind,
    /// Human-readable name.
    pub title: &'static str,
    /// Whether commands must be preceded by `setmode`.
    pub uses_modes: bool,
    /// Whether the board keeps a MAC registry (`newmac`, `newdut`, ...).
    pub mac_registry: bool,
    /// Whether the board supports `debugMode`.
    pub diagnostics: bool,
    /// Whether the board answers `getsettings`.
    pub settings_query: bool,
    /// Firmware image shipped for this board, if any.
    pub default_firmware: Option<&'static str>,
    /// Prefixes of settings-report lines.
    pub report_prefixes: &'static [&'static str],
    /// Writable settings.
    pub settings: &'static [SettingSpec],
}

impl BoardProfile {
    /// Find a setting by key.
    pub fn setting(&self, key: &str) -> Option<&'static SettingSpec> {
        self.settings
            .iter()
            .find(|s| s.key == key)
    }

    /// Whether `line` is a settings report.
    #[must_use]
    pub fn is_report_line(&self, line: &str) -> bool {
        self.report_prefixes
            .iter()
            .any(|prefix| line.starts_with(prefix))
    }
}

/// One writable setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingSpec {
    /// Stable key used by callers (e.g. `update-interval`).
    pub key: &'static str,
    /// Protocol command (e.g. `setupdate`).
    pub command: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Accepted values.
    pub kind: ValueKind,
    /// Mode the device must be in, for boards with modes.
    pub mode: Option<DeviceMode>,
}

impl SettingSpec {
    /// Validate `raw` and build the protocol line (without newline).
    pub fn command_line(&self, raw: &str) -> Result<String> {
        let value = self
            .kind
            .validate(raw)
            .map_err(|reason| Error::InvalidFormat(format!("{}: {reason}", self.label)))?;
        Ok(format!("{} {value}", self.command))
    }
}

/// Validator for a setting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Integer within an inclusive range.
    Integer {
        /// Lowest accepted value.
        min: i64,
        /// Highest accepted value.
        max: i64,
    },
    /// Decimal number; zero is accepted only when `allow_zero` is set.
    Decimal {
        /// Accept zero.
        allow_zero: bool,
    },
    /// Non-empty text.
    Text,
    /// Non-empty text that should not be echoed.
    Secret,
    /// URL with a mandatory scheme prefix.
    Url {
        /// Required prefix, e.g. `http://`.
        scheme: &'static str,
    },
    /// MAC address.
    Mac,
}

const UNSIGNED: ValueKind = ValueKind::Integer {
    min: 0,
    max: 4_294_967_295,
};

impl ValueKind {
    /// Check `raw` and return the value to send.
    ///
    /// Input is trimmed first. Control characters are never accepted since a
    /// line break would start a second command.
    pub fn validate(&self, raw: &str) -> std::result::Result<String, String> {
        let value = raw.trim();
        if value.is_empty() {
            return Err("value is empty".to_string());
        }
        if value
            .chars()
            .any(char::is_control)
        {
            return Err("value contains control characters".to_string());
        }

        match *self {
            Self::Integer { min, max } => {
                let n: i64 = value
                    .parse()
                    .map_err(|_| format!("'{value}' is not an integer"))?;
                if !(min..=max).contains(&n) {
                    return Err(format!("{n} is outside {min}..={max}"));
                }
                Ok(n.to_string())
            },
            Self::Decimal { allow_zero } => {
                let n: f64 = value
                    .parse()
                    .map_err(|_| format!("'{value}' is not a number"))?;
                if !n.is_finite() || n < 0.0 || (!allow_zero && n <= 0.0) {
                    let bound = if allow_zero { "zero or positive" } else { "positive" };
                    return Err(format!("'{value}' must be {bound}"));
                }
                Ok(value.to_string())
            },
            Self::Text | Self::Secret => Ok(value.to_string()),
            Self::Url { scheme } => {
                if value.len() > scheme.len() && value.starts_with(scheme) {
                    Ok(value.to_string())
                } else {
                    Err(format!("URL must start with {scheme}"))
                }
            },
            Self::Mac => MacAddress::parse(value)
                .map(|mac| mac.to_string())
                .map_err(|_| format!("'{value}' is not a MAC address")),
        }
    }

    /// Short description for help output.
    #[must_use]
    pub fn describe(&self) -> String {
        match *self {
            Self::Integer { .. } if *self == UNSIGNED => "non-negative integer".to_string(),
            Self::Integer { min, max } => format!("integer {min}..={max}"),
            Self::Decimal { allow_zero: true } => "number >= 0".to_string(),
            Self::Decimal { allow_zero: false } => "number > 0".to_string(),
            Self::Text => "text".to_string(),
            Self::Secret => "secret text".to_string(),
            Self::Url { scheme } => format!("URL starting with {scheme}"),
            Self::Mac => "MAC address".to_string(),
        }
    }

    /// Whether values of this kind should be masked when displayed.
    #[must_use]
    pub fn is_secret(&self) -> bool {
        matches!(self, Self::Secret)
    }
}

const fn label_setting(
    key: &'static str,
    command: &'static str,
    label: &'static str,
    kind: ValueKind,
) -> SettingSpec {
    SettingSpec {
        key,
        command,
        label,
        kind,
        mode: Some(DeviceMode::Label),
    }
}

const fn setting(
    key: &'static str,
    command: &'static str,
    label: &'static str,
    kind: ValueKind,
) -> SettingSpec {
    SettingSpec {
        key,
        command,
        label,
        kind,
        mode: None,
    }
}

const DEVICE_ID: SettingSpec = setting("device-id", "setdeviceid", "Device ID", UNSIGNED);
const CLIENT_ID: SettingSpec = setting("client-id", "setclientid", "Client ID", ValueKind::Text);
const SSID: SettingSpec = setting("ssid", "setssid", "Wi-Fi SSID", ValueKind::Text);
const PASSWORD: SettingSpec = setting(
    "password",
    "setpassword",
    "Wi-Fi password",
    ValueKind::Secret,
);
const URL: SettingSpec = setting(
    "url",
    "seturl",
    "Server URL",
    ValueKind::Url { scheme: "http://" },
);

const BLE_BASE_SETTINGS: [SettingSpec; 5] = [
    label_setting(
        "update-interval",
        "setupdate",
        "Update interval",
        UNSIGNED,
    ),
    label_setting("hold-time", "setbtime", "Best RSSI hold time", UNSIGNED),
    label_setting("hold-count", "setbcount", "Best RSSI hold count", UNSIGNED),
    label_setting(
        "rssi-threshold",
        "setbthreshold",
        "RSSI threshold",
        ValueKind::Integer {
            min: -128,
            max: 127,
        },
    ),
    label_setting("network-address", "setnetaddr", "Network address", UNSIGNED),
];

const FUEL_SETTINGS: [SettingSpec; 2] = [
    setting(
        "litres",
        "reset",
        "Tank volume (litres)",
        ValueKind::Decimal { allow_zero: true },
    ),
    setting(
        "impulses",
        "set",
        "Impulses per litre",
        ValueKind::Decimal { allow_zero: false },
    ),
];

const WIFI_SETTINGS: [SettingSpec; 5] = [DEVICE_ID, CLIENT_ID, SSID, PASSWORD, URL];

const TEMPERATURE_BLE_SETTINGS: [SettingSpec; 5] = [
    DEVICE_ID,
    CLIENT_ID,
    SSID,
    PASSWORD,
    setting("ble-mac", "setblemac", "BLE peer MAC", ValueKind::Mac),
];

static BLE_BASE: BoardProfile = BoardProfile {
    kind: BoardKind::BleBase,
    title: "BLE base",
    uses_modes: true,
    mac_registry: true,
    diagnostics: true,
    settings_query: true,
    default_firmware: Some("esp32.bin"),
    report_prefixes: &["Сетевой адрес:", "Режим работы:", "Период"],
    settings: &BLE_BASE_SETTINGS,
};

static FUEL_INDICATOR: BoardProfile = BoardProfile {
    kind: BoardKind::FuelIndicator,
    title: "Fuel indicator",
    uses_modes: false,
    mac_registry: false,
    diagnostics: false,
    settings_query: false,
    default_firmware: None,
    report_prefixes: &[],
    settings: &FUEL_SETTINGS,
};

static CURRENT_SENSOR: BoardProfile = BoardProfile {
    kind: BoardKind::CurrentSensor,
    title: "Current sensor",
    uses_modes: false,
    mac_registry: false,
    diagnostics: false,
    settings_query: true,
    default_firmware: Some("esp32_current.bin"),
    report_prefixes: &[],
    settings: &WIFI_SETTINGS,
};

static TEMPERATURE_SENSOR: BoardProfile = BoardProfile {
    kind: BoardKind::TemperatureSensor,
    title: "Temperature sensor",
    uses_modes: false,
    mac_registry: false,
    diagnostics: false,
    settings_query: true,
    default_firmware: Some("esp32_temp.bin"),
    report_prefixes: &[],
    settings: &WIFI_SETTINGS,
};

static TEMPERATURE_SENSOR_BLE: BoardProfile = BoardProfile {
    kind: BoardKind::TemperatureSensorBle,
    title: "Temperature sensor (BLE)",
    uses_modes: false,
    mac_registry: false,
    diagnostics: false,
    settings_query: true,
    default_firmware: Some("esp32_temp_ble.bin"),
    report_prefixes: &[],
    settings: &TEMPERATURE_BLE_SETTINGS,
};

static ATTENDANCE_READER: BoardProfile = BoardProfile {
    kind: BoardKind::AttendanceReader,
    title: "Attendance reader",
    uses_modes: false,
    mac_registry: false,
    diagnostics: false,
    settings_query: true,
    default_firmware: Some("esp32_attendance.bin"),
    report_prefixes: &[],
    settings: &WIFI_SETTINGS,
};

/// Byte number sent with a DUT registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteNumber {
    /// Known sensor preset.
    Preset(DutPreset),
    /// User-supplied value.
    Custom(u32),
}

impl ByteNumber {
    /// Parse a user-supplied byte number from free text.
    pub fn parse_custom(text: &str) -> Result<Self> {
        let text = text.trim();
        match text.parse::<u32>() {
            Ok(n) if n > 0 => Ok(Self::Custom(n)),
            _ => Err(Error::InvalidFormat(format!(
                "byte number must be a positive integer, got '{text}'"
            ))),
        }
    }

    /// Numeric value sent on the wire.
    #[must_use]
    pub fn value(self) -> u32 {
        match self {
            Self::Preset(preset) => preset.byte_number(),
            Self::Custom(n) => n,
        }
    }
}

/// Known DUT sensor presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutPreset {
    /// Escort fuel-level sensor.
    Escort,
}

impl DutPreset {
    /// Byte number for this preset.
    #[must_use]
    pub fn byte_number(self) -> u32 {
        match self {
            Self::Escort => ESCORT_BYTE_NUMBER,
        }
    }
}
