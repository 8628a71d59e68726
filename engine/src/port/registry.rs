use super::{OwnerType, PortConnectionsManager, PortId, PortIdentifier, PortType, SourceLink};
use crate::audio::{MeterRing, PeakMeter};
use crate::context::{DENORMAL_PREVENTION_VAL, TrackState};
use crate::midi::MidiEvents;
use std::collections::HashMap;

/// Initial capacity of a port's link cache.
const SOURCE_CAPACITY: usize = 16;

#[derive(Debug)]
pub enum PortData {
    /// Audio and CV ports: one block of samples.
    Signal(Vec<f32>),
    Event(MidiEvents),
    Control(f32),
}

/// A port together with its per-block state.
#[derive(Debug)]
pub struct Port {
    identifier: PortIdentifier,
    pub(crate) data: PortData,
    pub(crate) srcs: Vec<SourceLink>,
    meter: Option<MeterRing>,
    pub(crate) peak: PeakMeter,
    /// CV range; also scales CV connection multipliers.
    pub minf: f32,
    pub maxf: f32,
    pub exposed_to_backend: bool,
    /// Event ports only: channels (bit 0 = channel 1) accepted from sources.
    pub channel_mask: Option<u16>,
}

impl Port {
    pub fn new(identifier: PortIdentifier, block_length: usize) -> Self {
        let data = match identifier.port_type() {
            PortType::Audio | PortType::CV => {
                PortData::Signal(vec![DENORMAL_PREVENTION_VAL; block_length])
            }
            PortType::Event => PortData::Event(MidiEvents::new()),
            PortType::Control => PortData::Control(0.0),
        };
        let meter = identifier.is_signal().then(MeterRing::default);
        Self {
            identifier,
            data,
            srcs: Vec::with_capacity(SOURCE_CAPACITY),
            meter,
            peak: PeakMeter::default(),
            minf: -1.0,
            maxf: 1.0,
            exposed_to_backend: false,
            channel_mask: None,
        }
    }

    pub fn with_range(mut self, minf: f32, maxf: f32) -> Self {
        self.minf = minf;
        self.maxf = maxf;
        self
    }

    pub fn exposed(mut self) -> Self {
        self.exposed_to_backend = true;
        self
    }

    pub fn with_channel_mask(mut self, mask: u16) -> Self {
        self.channel_mask = Some(mask);
        self
    }

    pub fn id(&self) -> PortId {
        self.identifier.id()
    }

    pub fn identifier(&self) -> &PortIdentifier {
        &self.identifier
    }

    pub fn buffer(&self) -> Option<&[f32]> {
        match &self.data {
            PortData::Signal(buf) => Some(buf),
            _ => None,
        }
    }

    pub fn buffer_mut(&mut self) -> Option<&mut [f32]> {
        match &mut self.data {
            PortData::Signal(buf) => Some(buf),
            _ => None,
        }
    }

    pub fn midi_events(&self) -> Option<&MidiEvents> {
        match &self.data {
            PortData::Event(events) => Some(events),
            _ => None,
        }
    }

    pub fn control_value(&self) -> Option<f32> {
        match self.data {
            PortData::Control(value) => Some(value),
            _ => None,
        }
    }

    pub fn set_control_value(&mut self, value: f32) -> bool {
        match &mut self.data {
            PortData::Control(slot) => {
                *slot = value;
                true
            }
            _ => false,
        }
    }

    /// Incoming connections as of the last topology refresh.
    pub fn sources(&self) -> &[SourceLink] {
        &self.srcs
    }

    pub fn meter(&self) -> Option<&MeterRing> {
        self.meter.as_ref()
    }

    pub fn peak(&self) -> Option<f32> {
        self.peak.peak()
    }

    /// Input ports read external data unless they belong to a track
    /// processor whose track is not recording.
    pub fn takes_external_input(&self, track: Option<&TrackState>) -> bool {
        if !self.identifier.is_input() {
            return false;
        }
        self.identifier.owner_type() != OwnerType::TrackProcessor
            || track.is_some_and(TrackState::is_recording)
    }

    pub fn set_block_length(&mut self, block_length: usize) {
        if let PortData::Signal(buf) = &mut self.data {
            buf.clear();
            buf.resize(block_length, DENORMAL_PREVENTION_VAL);
        }
    }

    pub fn clear_buffer(&mut self, denormal: f32) {
        match &mut self.data {
            PortData::Signal(buf) => buf.fill(denormal),
            PortData::Event(events) => events.clear_active(),
            PortData::Control(_) => {}
        }
    }
}

/// Arena of every live port, addressed by [`PortId`].
#[derive(Debug, Default)]
pub struct PortRegistry {
    ports: Vec<Port>,
    index: HashMap<PortId, usize>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `port`, replacing any port registered under the same id.
    pub fn add(&mut self, port: Port) -> PortId {
        let id = port.id();
        match self.index.get(&id) {
            Some(&idx) => self.ports[idx] = port,
            None => {
                self.index.insert(id, self.ports.len());
                self.ports.push(port);
            }
        }
        id
    }

    pub fn remove(&mut self, id: &PortId) -> Option<Port> {
        let idx = self.index.remove(id)?;
        let port = self.ports.swap_remove(idx);
        if let Some(moved) = self.ports.get(idx) {
            self.index.insert(moved.id(), idx);
        }
        Some(port)
    }

    pub fn contains(&self, id: &PortId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &PortId) -> Option<&Port> {
        self.index.get(id).map(|&idx| &self.ports[idx])
    }

    pub fn get_mut(&mut self, id: &PortId) -> Option<&mut Port> {
        self.index.get(id).map(|&idx| &mut self.ports[idx])
    }

    pub(crate) fn index_of(&self, id: &PortId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn port_at(&self, idx: usize) -> &Port {
        &self.ports[idx]
    }

    pub(crate) fn port_at_mut(&mut self, idx: usize) -> &mut Port {
        &mut self.ports[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn set_block_length(&mut self, block_length: usize) {
        for port in &mut self.ports {
            port.set_block_length(block_length);
        }
    }

    /// Exchanges every port's cached links with the list prepared for it in
    /// `pending`. Ports without an entry lose their links. Neither allocates
    /// nor frees, so it is safe on the audio thread.
    pub fn install_sources(&mut self, pending: &mut HashMap<PortId, Vec<SourceLink>>) {
        for port in &mut self.ports {
            match pending.get_mut(&port.id()) {
                Some(links) => std::mem::swap(&mut port.srcs, links),
                None => port.srcs.clear(),
            }
        }
    }

    /// Rebuilds every port's cached incoming links from `connections`,
    /// preserving registration order. Allocates; not for the audio thread.
    pub fn refresh_sources(&mut self, connections: &PortConnectionsManager) {
        for port in &mut self.ports {
            port.srcs.clear();
        }
        for conn in connections.connections() {
            if let Some(&idx) = self.index.get(&conn.dest) {
                self.ports[idx].srcs.push(SourceLink::from(conn));
            }
        }
    }
}
