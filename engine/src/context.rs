use crate::hw::traits::AudioBackend;
use crate::port::PortId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Value written into silent signal buffers so downstream DSP never runs on
/// denormals.
pub const DENORMAL_PREVENTION_VAL: f32 = 1e-20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub block_length: usize,
    pub sample_rate: u32,
    pub denormal: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_length: 256,
            sample_rate: 48_000,
            denormal: DENORMAL_PREVENTION_VAL,
        }
    }
}

impl EngineConfig {
    pub fn new(block_length: usize, sample_rate: u32) -> Self {
        Self {
            block_length,
            sample_rate,
            ..Self::default()
        }
    }
}

/// Sub-range of the current block a port is asked to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeInfo {
    /// Global position of the block start, in frames.
    pub g_start_frame: u64,
    pub local_offset: usize,
    pub nframes: usize,
}

impl TimeInfo {
    pub fn new(g_start_frame: u64, local_offset: usize, nframes: usize) -> Self {
        Self {
            g_start_frame,
            local_offset,
            nframes,
        }
    }

    pub fn full_block(g_start_frame: u64, block_length: usize) -> Self {
        Self::new(g_start_frame, 0, block_length)
    }

    pub fn end(&self) -> usize {
        self.local_offset + self.nframes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BounceMode {
    #[default]
    Off,
    On,
}

/// Point in a track's signal chain that bounce taps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BounceStep {
    BeforeInserts,
    PreFader,
    #[default]
    PostFader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BounceState {
    pub mode: BounceMode,
    pub step: BounceStep,
    /// When false, the regular mix into the master is muted and only the
    /// tapped tracks reach it.
    pub with_parents: bool,
}

impl BounceState {
    pub fn is_active(&self) -> bool {
        self.mode != BounceMode::Off
    }
}

/// Port handles of the master track the bounce path writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterBus {
    pub track: Uuid,
    /// Master track processor stereo input, L then R.
    pub stereo_in: [PortId; 2],
    /// Master channel stereo output, L then R.
    pub stereo_out: [PortId; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Instrument,
    Audio,
    Midi,
    AudioBus,
    AudioGroup,
    MidiBus,
    MidiGroup,
    Master,
    Chord,
    Modulator,
}

impl TrackKind {
    pub fn can_record(&self) -> bool {
        matches!(
            self,
            TrackKind::Instrument | TrackKind::Audio | TrackKind::Midi | TrackKind::Chord
        )
    }
}

/// Per-track flags the routing path consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackState {
    pub kind: TrackKind,
    pub recording: bool,
    pub bounce: bool,
    pub bounce_to_master: bool,
}

impl TrackState {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            recording: false,
            bounce: false,
            bounce_to_master: false,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.kind.can_record() && self.recording
    }
}

pub type TrackTable = HashMap<Uuid, TrackState>;

/// Everything port processing needs to know about the engine for one block.
#[derive(Clone, Copy)]
pub struct ProcessContext<'a> {
    pub config: EngineConfig,
    pub backend: Option<&'a dyn AudioBackend>,
    pub bounce: BounceState,
    pub master: Option<MasterBus>,
    pub tracks: &'a TrackTable,
    /// Monotonic clock in microseconds at the start of the block.
    pub timestamp_usecs: u64,
}

impl<'a> ProcessContext<'a> {
    pub fn new(config: EngineConfig, tracks: &'a TrackTable) -> Self {
        Self {
            config,
            backend: None,
            bounce: BounceState::default(),
            master: None,
            tracks,
            timestamp_usecs: 0,
        }
    }

    pub fn with_backend(mut self, backend: &'a dyn AudioBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_bounce(mut self, bounce: BounceState) -> Self {
        self.bounce = bounce;
        self
    }

    pub fn with_master(mut self, master: MasterBus) -> Self {
        self.master = Some(master);
        self
    }

    pub fn at(mut self, timestamp_usecs: u64) -> Self {
        self.timestamp_usecs = timestamp_usecs;
        self
    }

    pub fn track(&self, id: Option<Uuid>) -> Option<&'a TrackState> {
        id.and_then(|id| self.tracks.get(&id))
    }
}
