use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable handle of a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(Uuid);

impl PortId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PortId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    Audio,
    CV,
    Event,
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortFlow {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginSlot {
    Instrument,
    Insert,
    MidiFx,
    Modulator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerType {
    Track,
    TrackProcessor,
    Channel,
    Fader,
    Plugin,
    Transport,
    Engine,
    HardwareProcessor,
}

/// Structural location of a port, carrying the weak back-references that
/// location implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortOwner {
    Track { track: Uuid },
    TrackProcessor { track: Uuid },
    Channel { track: Uuid },
    /// Track faders carry their track; monitor and sample-processor faders
    /// do not.
    Fader { track: Option<Uuid> },
    Plugin {
        track: Option<Uuid>,
        plugin: Uuid,
        slot: PluginSlot,
    },
    Transport,
    Engine,
    HardwareProcessor,
}

impl PortOwner {
    pub fn owner_type(&self) -> OwnerType {
        match self {
            PortOwner::Track { .. } => OwnerType::Track,
            PortOwner::TrackProcessor { .. } => OwnerType::TrackProcessor,
            PortOwner::Channel { .. } => OwnerType::Channel,
            PortOwner::Fader { .. } => OwnerType::Fader,
            PortOwner::Plugin { .. } => OwnerType::Plugin,
            PortOwner::Transport => OwnerType::Transport,
            PortOwner::Engine => OwnerType::Engine,
            PortOwner::HardwareProcessor => OwnerType::HardwareProcessor,
        }
    }

    pub fn track(&self) -> Option<Uuid> {
        match *self {
            PortOwner::Track { track }
            | PortOwner::TrackProcessor { track }
            | PortOwner::Channel { track } => Some(track),
            PortOwner::Fader { track } | PortOwner::Plugin { track, .. } => track,
            PortOwner::Transport | PortOwner::Engine | PortOwner::HardwareProcessor => None,
        }
    }

    pub fn plugin(&self) -> Option<Uuid> {
        match *self {
            PortOwner::Plugin { plugin, .. } => Some(plugin),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PortFlags: u32 {
        const STEREO_L = 1 << 0;
        const STEREO_R = 1 << 1;
        const PIANO_ROLL = 1 << 2;
        const SIDECHAIN = 1 << 3;
        const MAIN_PORT = 1 << 4;
        const MANUAL_PRESS = 1 << 5;
        const AMPLITUDE = 1 << 6;
        const STEREO_BALANCE = 1 << 7;
        const TOGGLE = 1 << 8;
        const INTEGER = 1 << 9;
        const FREEWHEEL = 1 << 10;
        const REPORTS_LATENCY = 1 << 11;
        const PLUGIN_ENABLED = 1 << 12;
        const PLUGIN_CONTROL = 1 << 13;
        const FADER_MUTE = 1 << 14;
        const CHANNEL_FADER = 1 << 15;
        const AUTOMATABLE = 1 << 16;
        const MIDI_AUTOMATABLE = 1 << 17;
        const SEND_RECEIVABLE = 1 << 18;
        const BPM = 1 << 19;
        const TP_MONO = 1 << 20;
        const TP_INPUT_GAIN = 1 << 21;
        const HW = 1 << 22;
        const MODULATOR_MACRO = 1 << 23;
        const LOGARITHMIC = 1 << 24;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PortFlags2: u32 {
        const TRANSPORT_ROLL = 1 << 0;
        const TRANSPORT_STOP = 1 << 1;
        const TRANSPORT_BACKWARD = 1 << 2;
        const TRANSPORT_FORWARD = 1 << 3;
        const TRANSPORT_LOOP_TOGGLE = 1 << 4;
        const TRANSPORT_REC_TOGGLE = 1 << 5;
        const SUPPORTS_PATCH_MESSAGE = 1 << 6;
        const ENUMERATION = 1 << 7;
        const URI_PARAM = 1 << 8;
        const SEQUENCE = 1 << 9;
        const SUPPORTS_MIDI = 1 << 10;
        const TP_OUTPUT_GAIN = 1 << 11;
        const TP_MONITOR_AUDIO = 1 << 12;
        const PREFADER = 1 << 13;
        const POSTFADER = 1 << 14;
        const MONITOR_FADER = 1 << 15;
        const SAMPLE_PROCESSOR_FADER = 1 << 16;
        const SAMPLE_PROCESSOR_TRACK = 1 << 17;
    }
}

/// The `Copy` subset of a [`PortIdentifier`] that processing dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRole {
    pub owner: PortOwner,
    pub port_type: PortType,
    pub flow: PortFlow,
    pub flags: PortFlags,
    pub flags2: PortFlags2,
}

impl PortRole {
    pub fn owner_type(&self) -> OwnerType {
        self.owner.owner_type()
    }

    pub fn is_input(&self) -> bool {
        self.flow == PortFlow::Input
    }

    pub fn is_output(&self) -> bool {
        self.flow == PortFlow::Output
    }

    pub fn is_stereo(&self) -> bool {
        self.flags.intersects(PortFlags::STEREO_L | PortFlags::STEREO_R)
    }

    pub fn is_prefader(&self) -> bool {
        self.flags2.contains(PortFlags2::PREFADER)
    }

    /// 0 for the left port of a stereo pair, 1 for the right.
    pub fn stereo_side(&self) -> Option<usize> {
        if self.flags.contains(PortFlags::STEREO_L) {
            Some(0)
        } else if self.flags.contains(PortFlags::STEREO_R) {
            Some(1)
        } else {
            None
        }
    }
}

/// Identity and metadata of a port.
///
/// Type and flow are fixed at construction; everything else may be edited by
/// the owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortIdentifier {
    id: PortId,
    port_type: PortType,
    flow: PortFlow,
    pub owner: PortOwner,
    pub label: String,
    pub symbol: String,
    pub port_index: usize,
    pub flags: PortFlags,
    pub flags2: PortFlags2,
}

impl PortIdentifier {
    pub fn new(label: impl Into<String>, port_type: PortType, flow: PortFlow, owner: PortOwner) -> Self {
        let label = label.into();
        let symbol = label.to_ascii_lowercase().replace(' ', "_");
        Self {
            id: PortId::new(),
            port_type,
            flow,
            owner,
            label,
            symbol,
            port_index: 0,
            flags: PortFlags::empty(),
            flags2: PortFlags2::empty(),
        }
    }

    pub fn with_flags(mut self, flags: PortFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_flags2(mut self, flags2: PortFlags2) -> Self {
        self.flags2 |= flags2;
        self
    }

    pub fn with_index(mut self, port_index: usize) -> Self {
        self.port_index = port_index;
        self
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    pub fn flow(&self) -> PortFlow {
        self.flow
    }

    pub fn role(&self) -> PortRole {
        PortRole {
            owner: self.owner,
            port_type: self.port_type,
            flow: self.flow,
            flags: self.flags,
            flags2: self.flags2,
        }
    }

    pub fn owner_type(&self) -> OwnerType {
        self.owner.owner_type()
    }

    pub fn track(&self) -> Option<Uuid> {
        self.owner.track()
    }

    pub fn is_input(&self) -> bool {
        self.flow == PortFlow::Input
    }

    pub fn is_output(&self) -> bool {
        self.flow == PortFlow::Output
    }

    pub fn is_stereo(&self) -> bool {
        self.role().is_stereo()
    }

    pub fn is_signal(&self) -> bool {
        matches!(self.port_type, PortType::Audio | PortType::CV)
    }

    pub fn is_prefader(&self) -> bool {
        self.role().is_prefader()
    }

    pub fn is_postfader(&self) -> bool {
        self.flags2.contains(PortFlags2::POSTFADER)
    }
}

impl fmt::Display for PortIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:?} {:?} {:?}]",
            self.label,
            self.owner_type(),
            self.port_type,
            self.flow
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_variant_exposes_track_reference() {
        let track = Uuid::new_v4();
        let id = PortIdentifier::new(
            "Stereo Out L",
            PortType::Audio,
            PortFlow::Output,
            PortOwner::Channel { track },
        )
        .with_flags(PortFlags::STEREO_L);

        assert_eq!(id.owner_type(), OwnerType::Channel);
        assert_eq!(id.track(), Some(track));
        assert!(id.is_stereo());
        assert!(id.is_output());
        assert_eq!(id.symbol, "stereo_out_l");
    }

    #[test]
    fn unowned_faders_have_no_track() {
        let id = PortIdentifier::new(
            "Monitor",
            PortType::Audio,
            PortFlow::Output,
            PortOwner::Fader { track: None },
        )
        .with_flags2(PortFlags2::MONITOR_FADER);
        assert_eq!(id.track(), None);
        assert!(!id.is_prefader());
    }

    #[test]
    fn identifiers_get_distinct_ids() {
        let a = PortIdentifier::new("a", PortType::CV, PortFlow::Input, PortOwner::Engine);
        let b = PortIdentifier::new("a", PortType::CV, PortFlow::Input, PortOwner::Engine);
        assert_ne!(a.id(), b.id());
    }
}
