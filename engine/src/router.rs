use crate::audio::process::process_signal;
use crate::context::{EngineConfig, ProcessContext, TimeInfo};
use crate::error::PortError;
use crate::midi::MidiEvents;
use crate::midi::process::process_events;
use crate::port::{Port, PortConnectionsManager, PortId, PortRegistry, PortType, SourceLink};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// The connection graph together with the per-destination link lists
/// derived from it.
///
/// Links are rebuilt on the editing thread after every change; the audio
/// thread only swaps them into its ports, so installing a new topology
/// neither allocates nor frees there.
#[derive(Debug, Default)]
pub struct RoutingTable {
    connections: PortConnectionsManager,
    pending: HashMap<PortId, Vec<SourceLink>>,
}

impl RoutingTable {
    fn new(connections: PortConnectionsManager) -> Self {
        let mut table = Self {
            connections,
            pending: HashMap::new(),
        };
        table.rebuild();
        table
    }

    pub fn connections(&self) -> &PortConnectionsManager {
        &self.connections
    }

    fn rebuild(&mut self) {
        self.pending.clear();
        for conn in self.connections.connections() {
            self.pending
                .entry(conn.dest)
                .or_default()
                .push(SourceLink::from(conn));
        }
    }
}

/// Guards the connection graph shared by the control and audio threads.
///
/// The control thread edits through [`edit`](Self::edit), which may block.
/// The audio thread only ever calls [`try_lock`](Self::try_lock). Every
/// edit bumps a generation counter so the audio side can tell whether its
/// cached topology is stale. One lock serves one [`Router`].
#[derive(Debug, Default)]
pub struct PortOperationLock {
    table: Mutex<RoutingTable>,
    generation: AtomicU64,
}

impl PortOperationLock {
    pub fn new(connections: PortConnectionsManager) -> Self {
        Self {
            table: Mutex::new(RoutingTable::new(connections)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn edit<R>(&self, f: impl FnOnce(&mut PortConnectionsManager) -> R) -> R {
        let mut table = self.table.lock();
        let result = f(&mut table.connections);
        table.rebuild();
        self.generation.fetch_add(1, Ordering::Release);
        result
    }

    pub fn read<R>(&self, f: impl FnOnce(&PortConnectionsManager) -> R) -> R {
        f(&self.table.lock().connections)
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, RoutingTable>> {
        self.table.try_lock()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Audio-thread owner of every port.
///
/// The scheduler calls [`prepare_for_processing`](Self::prepare_for_processing)
/// once per block, then [`process`](Self::process) for each port in
/// topological order.
#[derive(Debug)]
pub struct Router {
    config: EngineConfig,
    registry: PortRegistry,
    lock: Arc<PortOperationLock>,
    seen_generation: Option<u64>,
}

impl Router {
    pub fn new(config: EngineConfig, lock: Arc<PortOperationLock>) -> Self {
        Self {
            config,
            registry: PortRegistry::new(),
            lock,
            seen_generation: None,
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn block_length(&self) -> usize {
        self.config.block_length
    }

    pub fn lock(&self) -> &Arc<PortOperationLock> {
        &self.lock
    }

    pub fn registry(&self) -> &PortRegistry {
        &self.registry
    }

    pub fn port(&self, id: &PortId) -> Option<&Port> {
        self.registry.get(id)
    }

    pub fn port_mut(&mut self, id: &PortId) -> Option<&mut Port> {
        self.registry.get_mut(id)
    }

    /// Registers `port`, resizing its buffer to the current block length
    /// and picking up any connections already made to it.
    pub fn add_port(&mut self, mut port: Port) -> PortId {
        port.set_block_length(self.config.block_length);
        let id = self.registry.add(port);
        self.lock
            .read(|connections| self.registry.refresh_sources(connections));
        id
    }

    /// Unregisters a port together with every connection touching it.
    pub fn remove_port(&mut self, id: &PortId) -> Option<Port> {
        let removed = self.lock.edit(|connections| connections.remove_all_connections(id));
        if removed > 0 {
            debug!("dropped {removed} connections of removed port {id}");
        }
        self.registry.remove(id)
    }

    /// Reallocates every signal buffer. Not for the audio thread.
    pub fn set_block_length(&mut self, block_length: usize) {
        self.config.block_length = block_length;
        self.registry.set_block_length(block_length);
    }

    /// Block-boundary hand-off with the control thread. Returns false when
    /// the graph is being edited; the block must then be skipped.
    pub fn prepare_for_processing(&mut self) -> bool {
        let Some(mut table) = self.lock.try_lock() else {
            return false;
        };
        let generation = self.lock.generation();
        if self.seen_generation != Some(generation) {
            self.registry.install_sources(&mut table.pending);
            self.seen_generation = Some(generation);
        }
        true
    }

    /// Silences every port for a block that could not be processed.
    pub fn skip_cycle(&mut self) {
        let denormal = self.config.denormal;
        for idx in 0..self.registry.len() {
            self.registry.port_at_mut(idx).clear_buffer(denormal);
        }
    }

    pub fn process(
        &mut self,
        port: PortId,
        ctx: &ProcessContext<'_>,
        time: &TimeInfo,
        noroll: bool,
    ) -> Result<(), PortError> {
        let port_type = self
            .registry
            .get(&port)
            .map(|p| p.identifier().port_type())
            .ok_or(PortError::UnknownPort(port))?;
        match port_type {
            PortType::Audio | PortType::CV => {
                process_signal(&mut self.registry, port, ctx, time, noroll)
            }
            PortType::Event => process_events(&self.registry, port, ctx, time, noroll),
            PortType::Control => Ok(()),
        }
    }

    pub fn clear_buffer(&mut self, port: &PortId) -> Result<(), PortError> {
        let denormal = self.config.denormal;
        self.registry
            .get_mut(port)
            .ok_or(PortError::UnknownPort(*port))?
            .clear_buffer(denormal);
        Ok(())
    }

    /// One full block: hand-off, clear, then every port of `order` over the
    /// whole block. Returns false if the block was skipped.
    pub fn run_cycle(
        &mut self,
        order: &[PortId],
        ctx: &ProcessContext<'_>,
        g_start_frame: u64,
        noroll: bool,
    ) -> Result<bool, PortError> {
        if !self.prepare_for_processing() {
            warn!("port operation lock busy, skipping cycle");
            self.skip_cycle();
            return Ok(false);
        }
        self.skip_cycle();
        let time = TimeInfo::full_block(g_start_frame, self.config.block_length);
        for port in order {
            self.process(*port, ctx, &time, noroll)?;
        }
        Ok(true)
    }

    pub fn buffer(&self, port: &PortId) -> Option<&[f32]> {
        self.registry.get(port).and_then(Port::buffer)
    }

    pub fn buffer_mut(&mut self, port: &PortId) -> Option<&mut [f32]> {
        self.registry.get_mut(port).and_then(Port::buffer_mut)
    }

    pub fn midi_events(&self, port: &PortId) -> Option<&MidiEvents> {
        self.registry.get(port).and_then(Port::midi_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{DENORMAL_PREVENTION_VAL, TrackTable};
    use crate::port::{PortFlow, PortIdentifier, PortOwner};

    fn audio_port(label: &str) -> Port {
        Port::new(
            PortIdentifier::new(label, PortType::Audio, PortFlow::Output, PortOwner::Engine),
            0,
        )
    }

    #[test]
    fn edits_become_visible_at_the_next_boundary() {
        let lock = Arc::new(PortOperationLock::default());
        let mut router = Router::new(EngineConfig::new(4, 48_000), lock.clone());
        let a = router.add_port(audio_port("a"));
        let d = router.add_port(audio_port("d"));
        assert!(router.prepare_for_processing());
        assert!(router.port(&d).unwrap().sources().is_empty());

        lock.edit(|m| m.add_connection(a, d, 1.0, false, true).is_some());
        assert!(router.port(&d).unwrap().sources().is_empty());
        assert!(router.prepare_for_processing());
        assert_eq!(router.port(&d).unwrap().sources().len(), 1);
    }

    #[test]
    fn new_links_are_swapped_in_without_reallocating() {
        let lock = Arc::new(PortOperationLock::default());
        let mut router = Router::new(EngineConfig::new(4, 48_000), lock.clone());
        let d = router.add_port(audio_port("d"));
        let srcs: Vec<PortId> = (0..20)
            .map(|i| router.add_port(audio_port(&format!("s{i}"))))
            .collect();
        lock.edit(|m| {
            for src in &srcs {
                m.add_connection(*src, d, 1.0, false, true);
            }
        });
        let prepared = lock.try_lock().unwrap().pending[&d].as_ptr();

        assert!(router.prepare_for_processing());
        let installed = router.port(&d).unwrap().sources();
        assert_eq!(installed.len(), 20);
        assert_eq!(installed.as_ptr(), prepared);
        assert_eq!(installed[19].src, srcs[19]);
    }

    #[test]
    fn ports_added_after_connecting_see_their_sources() {
        let lock = Arc::new(PortOperationLock::default());
        let mut router = Router::new(EngineConfig::new(4, 48_000), lock.clone());
        let a = audio_port("a");
        let d = audio_port("d");
        let (a_id, d_id) = (a.id(), d.id());
        lock.edit(|m| m.add_connection(a_id, d_id, 0.5, false, true).is_some());
        assert!(router.prepare_for_processing());

        router.add_port(a);
        router.add_port(d);
        assert!(router.prepare_for_processing());
        assert_eq!(router.port(&d_id).unwrap().sources().len(), 1);
    }

    #[test]
    fn busy_lock_skips_the_cycle() {
        let lock = Arc::new(PortOperationLock::default());
        let mut router = Router::new(EngineConfig::new(4, 48_000), lock.clone());
        let a = router.add_port(audio_port("a"));
        router.buffer_mut(&a).unwrap().fill(0.5);

        let tracks = TrackTable::new();
        let ctx = ProcessContext::new(router.config(), &tracks);
        let guard = lock.try_lock().unwrap();
        assert!(!router.run_cycle(&[a], &ctx, 0, false).unwrap());
        drop(guard);
        assert!(
            router
                .buffer(&a)
                .unwrap()
                .iter()
                .all(|s| *s == DENORMAL_PREVENTION_VAL)
        );
    }

    #[test]
    fn removing_a_port_drops_its_connections() {
        let lock = Arc::new(PortOperationLock::default());
        let mut router = Router::new(EngineConfig::new(4, 48_000), lock.clone());
        let a = router.add_port(audio_port("a"));
        let d = router.add_port(audio_port("d"));
        lock.edit(|m| m.add_connection(a, d, 1.0, false, true).is_some());
        assert!(router.remove_port(&a).is_some());
        assert!(lock.read(|m| m.is_empty()));
        assert!(router.prepare_for_processing());
        assert!(router.port(&d).unwrap().sources().is_empty());
    }

    #[test]
    fn control_ports_process_as_noop() {
        let lock = Arc::new(PortOperationLock::default());
        let mut router = Router::new(EngineConfig::new(4, 48_000), lock);
        let c = router.add_port(Port::new(
            PortIdentifier::new("gain", PortType::Control, PortFlow::Input, PortOwner::Engine),
            4,
        ));
        router.port_mut(&c).unwrap().set_control_value(0.3);
        let tracks = TrackTable::new();
        let ctx = ProcessContext::new(router.config(), &tracks);
        router
            .process(c, &ctx, &TimeInfo::full_block(0, 4), false)
            .unwrap();
        assert_eq!(router.port(&c).unwrap().control_value(), Some(0.3));
    }
}
