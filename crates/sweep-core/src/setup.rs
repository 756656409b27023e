//! Sweep axis values and the per-point experiment setup.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, SweepError};

/// IEEE 802.15.4 channel in the 2.4 GHz band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Channel(u8);

impl Channel {
    /// Lowest valid channel.
    pub const MIN: u8 = 11;
    /// Highest valid channel.
    pub const MAX: u8 = 26;

    /// Validates a raw channel number.
    pub fn new(raw: u16) -> Result<Self, SweepError> {
        if raw < Self::MIN as u16 || raw > Self::MAX as u16 {
            return Err(SweepError::Configuration(
                ErrorInfo::new("channel_range", "channel outside the 802.15.4 range")
                    .with_context("channel", raw.to_string())
                    .with_hint(format!("use a channel in [{}, {}]", Self::MIN, Self::MAX)),
            ));
        }
        Ok(Self(raw as u8))
    }

    /// Returns the raw channel number.
    pub fn as_raw(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u16> for Channel {
    type Error = SweepError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Channel::new(raw)
    }
}

impl From<Channel> for u16 {
    fn from(channel: Channel) -> Self {
        channel.0 as u16
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Only this source channel may be jammed by the external jammer.
pub const JAMMER_SOURCE_CHANNEL: u8 = 26;
/// WiFi channel the external jammer transmits on when covering [`JAMMER_SOURCE_CHANNEL`].
pub const JAMMER_TARGET_CHANNEL: u8 = 14;

/// Maps an 802.15.4 channel onto the WiFi channel used by the external jammer.
pub fn map_jammer_channel(channel: Channel) -> Result<u8, SweepError> {
    if channel.as_raw() == JAMMER_SOURCE_CHANNEL {
        Ok(JAMMER_TARGET_CHANNEL)
    } else {
        Err(SweepError::Configuration(
            ErrorInfo::new("jammer_channel", "external jammer cannot cover this channel")
                .with_context("channel", channel.to_string())
                .with_hint(format!(
                    "the external jammer only supports channel {JAMMER_SOURCE_CHANNEL}"
                )),
        ))
    }
}

/// Radio duty-cycling driver compiled into the communication firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RdcDriver {
    /// Radio always on.
    #[serde(rename = "nullrdc_driver")]
    NullRdc,
    /// ContikiMAC low-power listening.
    #[serde(rename = "contikimac_driver")]
    ContikiMac,
}

impl RdcDriver {
    /// Name of the driver as understood by the firmware build.
    pub fn as_str(&self) -> &'static str {
        match self {
            RdcDriver::NullRdc => "nullrdc_driver",
            RdcDriver::ContikiMac => "contikimac_driver",
        }
    }
}

impl Display for RdcDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interference source selected for a sweep point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterferenceType(u16);

/// Classification of an [`InterferenceType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterferenceKind {
    /// Interference firmware loaded but silent.
    None,
    /// Interference firmware profile 1-7.
    Local(u8),
    /// External RF jammer.
    ExternalJammer,
}

impl InterferenceType {
    /// No interference.
    pub const NONE: InterferenceType = InterferenceType(0);
    /// Highest local interference-firmware profile.
    pub const LOCAL_MAX: u16 = 7;
    /// Sentinel selecting the external RF jammer.
    pub const EXTERNAL_JAMMER: InterferenceType = InterferenceType(0x701);

    /// Validates a raw interference type.
    pub fn new(raw: u16) -> Result<Self, SweepError> {
        let candidate = InterferenceType(raw);
        if raw <= Self::LOCAL_MAX || candidate == Self::EXTERNAL_JAMMER {
            Ok(candidate)
        } else {
            Err(SweepError::Configuration(
                ErrorInfo::new("interference_type", "unknown interference type")
                    .with_context("interference_type", raw.to_string())
                    .with_hint("use 0-7 or 0x701 (1793) for the external jammer"),
            ))
        }
    }

    /// Returns the raw value passed to the interference firmware.
    pub fn as_raw(&self) -> u16 {
        self.0
    }

    /// Classifies the interference type.
    pub fn kind(&self) -> InterferenceKind {
        match self.0 {
            0 => InterferenceKind::None,
            raw if raw <= Self::LOCAL_MAX => InterferenceKind::Local(raw as u8),
            _ => InterferenceKind::ExternalJammer,
        }
    }

    /// True when the interference firmware (rather than the jammer) handles this type.
    pub fn is_firmware(&self) -> bool {
        self.0 <= Self::LOCAL_MAX
    }
}

impl Display for InterferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical role of an attached mote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// Mote transmitting the test traffic and reporting the terminal summary.
    Sending,
    /// Mote receiving the test traffic.
    Receiving,
    /// Mote running the interference firmware.
    Jamlab,
}

impl DeviceRole {
    /// Name of the role in configuration files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceRole::Sending => "sending",
            DeviceRole::Receiving => "receiving",
            DeviceRole::Jamlab => "jamlab",
        }
    }
}

impl Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which artefacts must be rebuilt before a sweep point runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildFlags {
    /// Rebuild and flash the communication firmware.
    pub communication: bool,
    /// Rebuild and flash the interference firmware.
    pub interference_firmware: bool,
    /// Reinstall the external jammer firmware (never set by the baseline policy).
    pub external_jammer: bool,
}

/// Fully resolved configuration of one sweep point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSetup {
    /// Radio channel used by the communication firmware.
    pub channel: Channel,
    /// Duty-cycling driver under test.
    pub rdc_driver: RdcDriver,
    /// Interference source active during the run.
    pub interference_type: InterferenceType,
    /// Clear channel assessment flag compiled into the firmware.
    pub cca: u8,
    /// Repetition index within the interference type.
    pub repetition: u32,
    /// Rebuild decisions derived from the sweep position.
    pub rebuild: RebuildFlags,
}

impl ExperimentSetup {
    /// Key of the build that stays fixed across interference types and repetitions.
    pub fn result_key(&self) -> ResultKey {
        ResultKey::new(self.channel, self.cca, self.rdc_driver)
    }
}

/// Identifies a firmware build: `<channel>-<cca>-<driver>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultKey(String);

impl ResultKey {
    /// Builds the key from its components.
    pub fn new(channel: Channel, cca: u8, driver: RdcDriver) -> Self {
        Self(format!("{}-{}-{}", channel, cca, driver))
    }

    /// Returns the textual key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Indices into the four sweep axes (driver, channel, interference, repetition).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SweepPosition {
    /// Index into the driver list.
    pub i: usize,
    /// Index into the channel list.
    pub j: usize,
    /// Index into the interference type list.
    pub k: usize,
    /// Repetition index.
    pub l: usize,
}

impl SweepPosition {
    /// Creates a position from its four indices.
    pub fn new(i: usize, j: usize, k: usize, l: usize) -> Self {
        Self { i, j, k, l }
    }

    /// Dash-joined indices used in artifact file names.
    pub fn label(&self) -> String {
        format!("{}-{}-{}-{}", self.i, self.j, self.k, self.l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_key_format() {
        let key = ResultKey::new(Channel::new(26).unwrap(), 0, RdcDriver::ContikiMac);
        assert_eq!(key.as_str(), "26-0-contikimac_driver");
    }

    #[test]
    fn interference_kinds() {
        assert_eq!(InterferenceType::new(0).unwrap().kind(), InterferenceKind::None);
        assert_eq!(InterferenceType::new(3).unwrap().kind(), InterferenceKind::Local(3));
        assert_eq!(
            InterferenceType::new(0x701).unwrap().kind(),
            InterferenceKind::ExternalJammer
        );
        assert!(InterferenceType::new(8).is_err());
        assert!(!InterferenceType::EXTERNAL_JAMMER.is_firmware());
    }
}
