use approx::assert_relative_eq;
use signalroute_engine::hw::DummyBackend;
use signalroute_engine::port::{
    Port, PortFlags, PortFlow, PortId, PortIdentifier, PortOwner, PortType,
};
use signalroute_engine::{
    BounceMode, BounceState, BounceStep, EngineConfig, MasterBus, PortError, PortOperationLock,
    ProcessContext, Router, TimeInfo, TrackKind, TrackState, TrackTable,
};
use std::sync::Arc;
use uuid::Uuid;

const BLOCK: usize = 8;

fn router() -> (Router, Arc<PortOperationLock>) {
    let lock = Arc::new(PortOperationLock::default());
    (Router::new(EngineConfig::new(BLOCK, 48_000), lock.clone()), lock)
}

fn audio(label: &str, flow: PortFlow, owner: PortOwner) -> Port {
    Port::new(
        PortIdentifier::new(label, PortType::Audio, flow, owner),
        BLOCK,
    )
}

fn stereo(
    router: &mut Router,
    label: &str,
    flow: PortFlow,
    owner: PortOwner,
) -> [PortId; 2] {
    [
        router.add_port(Port::new(
            PortIdentifier::new(format!("{label} L"), PortType::Audio, flow, owner)
                .with_flags(PortFlags::STEREO_L),
            BLOCK,
        )),
        router.add_port(Port::new(
            PortIdentifier::new(format!("{label} R"), PortType::Audio, flow, owner)
                .with_flags(PortFlags::STEREO_R),
            BLOCK,
        )),
    ]
}

fn assert_all(router: &Router, port: &PortId, expected: f32) {
    for sample in router.buffer(port).unwrap() {
        assert_relative_eq!(*sample, expected, epsilon = 1e-6);
    }
}

/// Two backend-fed inputs summed into one output with per-edge gains.
struct MixFixture {
    router: Router,
    lock: Arc<PortOperationLock>,
    backend: DummyBackend,
    a: PortId,
    b: PortId,
    d: PortId,
}

impl MixFixture {
    fn new() -> Self {
        let (mut router, lock) = router();
        let a = router.add_port(audio("a", PortFlow::Input, PortOwner::Engine));
        let b = router.add_port(audio("b", PortFlow::Input, PortOwner::Engine));
        let d = router.add_port(audio("d", PortFlow::Output, PortOwner::Engine));
        lock.edit(|m| {
            m.add_connection(a, d, 1.0, false, true);
            m.add_connection(b, d, 2.0, false, true);
        });
        let backend = DummyBackend::new(BLOCK);
        backend.set_input(a, vec![0.5; BLOCK]);
        backend.set_input(b, vec![0.25; BLOCK]);
        Self {
            router,
            lock,
            backend,
            a,
            b,
            d,
        }
    }

    fn run(&mut self, noroll: bool) -> Result<bool, PortError> {
        let tracks = TrackTable::new();
        let ctx = ProcessContext::new(self.router.config(), &tracks).with_backend(&self.backend);
        let order = [self.a, self.b, self.d];
        self.router.run_cycle(&order, &ctx, 0, noroll)
    }
}

#[test]
fn sources_are_summed_with_their_multipliers() {
    let mut fx = MixFixture::new();
    assert!(fx.run(false).unwrap());
    assert_all(&fx.router, &fx.a, 0.5);
    assert_all(&fx.router, &fx.b, 0.25);
    assert_all(&fx.router, &fx.d, 1.0);
}

#[test]
fn disabled_connections_contribute_nothing() {
    let mut fx = MixFixture::new();
    let (b, d) = (fx.b, fx.d);
    assert!(fx.lock.edit(|m| m.update_connection(&b, &d, 2.0, false, false)));
    assert!(fx.run(false).unwrap());
    assert_all(&fx.router, &fx.d, 0.5);

    assert!(fx.lock.edit(|m| m.update_connection(&b, &d, 2.0, false, true)));
    assert!(fx.run(false).unwrap());
    assert_all(&fx.router, &fx.d, 1.0);
}

#[test]
fn repeated_blocks_give_identical_output() {
    let mut fx = MixFixture::new();
    fx.run(false).unwrap();
    let first = fx.router.buffer(&fx.d).unwrap().to_vec();
    fx.run(false).unwrap();
    assert_eq!(fx.router.buffer(&fx.d).unwrap(), first.as_slice());
}

#[test]
fn split_blocks_are_metered_once_complete() {
    let mut fx = MixFixture::new();
    assert!(fx.router.prepare_for_processing());
    fx.router.skip_cycle();
    let tracks = TrackTable::new();
    let ctx = ProcessContext::new(fx.router.config(), &tracks).with_backend(&fx.backend);
    let half = BLOCK / 2;

    for port in [fx.a, fx.b, fx.d] {
        fx.router
            .process(port, &ctx, &TimeInfo::new(0, 0, half), false)
            .unwrap();
    }
    let meter = fx.router.port(&fx.d).unwrap().meter().unwrap();
    assert_eq!(meter.available_read(), 0);

    for port in [fx.a, fx.b, fx.d] {
        fx.router
            .process(port, &ctx, &TimeInfo::new(0, half, half), false)
            .unwrap();
    }
    let mut metered = [0.0; BLOCK];
    let meter = fx.router.port(&fx.d).unwrap().meter().unwrap();
    assert_eq!(meter.read(&mut metered), BLOCK);
    for sample in metered {
        assert_relative_eq!(sample, 1.0, epsilon = 1e-6);
    }
}

#[test]
fn noroll_blocks_are_silent() {
    let mut fx = MixFixture::new();
    assert!(fx.run(true).unwrap());
    for port in [fx.a, fx.b, fx.d] {
        assert_all(&fx.router, &port, 0.0);
    }
}

#[test]
fn busy_graph_skips_the_block() {
    let mut fx = MixFixture::new();
    let lock = fx.lock.clone();
    let guard = lock.try_lock().unwrap();
    assert!(!fx.run(false).unwrap());
    drop(guard);
    assert_all(&fx.router, &fx.d, 0.0);
    assert!(fx.run(false).unwrap());
    assert_all(&fx.router, &fx.d, 1.0);
}

#[test]
fn short_buffers_are_reported() {
    let (mut router, _lock) = router();
    let d = router.add_port(audio("d", PortFlow::Output, PortOwner::Engine));
    let tracks = TrackTable::new();
    let wider = EngineConfig::new(BLOCK * 2, 48_000);
    let ctx = ProcessContext::new(wider, &tracks);
    let err = router.run_cycle(&[d], &ctx, 0, false).unwrap_err();
    assert_eq!(
        err,
        PortError::BufferTooShort {
            port: d,
            expected: BLOCK * 2,
            actual: BLOCK,
        }
    );
}

/// One recording audio track feeding the master through its channel.
struct BounceFixture {
    router: Router,
    tracks: TrackTable,
    backend: DummyBackend,
    master: MasterBus,
    track: Uuid,
    channel: [PortId; 2],
    order: Vec<PortId>,
}

impl BounceFixture {
    fn new() -> Self {
        let (mut router, lock) = router();
        let track = Uuid::new_v4();
        let master_track = Uuid::new_v4();
        let mut tracks = TrackTable::new();
        let mut state = TrackState::new(TrackKind::Audio);
        state.recording = true;
        state.bounce_to_master = true;
        tracks.insert(track, state);
        tracks.insert(master_track, TrackState::new(TrackKind::Master));

        let input = stereo(
            &mut router,
            "in",
            PortFlow::Input,
            PortOwner::TrackProcessor { track },
        );
        let channel = stereo(
            &mut router,
            "channel",
            PortFlow::Output,
            PortOwner::Channel { track },
        );
        let master_in = stereo(
            &mut router,
            "master in",
            PortFlow::Input,
            PortOwner::TrackProcessor {
                track: master_track,
            },
        );
        let master_out = stereo(
            &mut router,
            "master out",
            PortFlow::Output,
            PortOwner::Channel {
                track: master_track,
            },
        );
        lock.edit(|m| {
            for side in 0..2 {
                m.add_connection(input[side], channel[side], 1.0, false, true);
                m.add_connection(channel[side], master_in[side], 1.0, false, true);
                m.add_connection(master_in[side], master_out[side], 1.0, false, true);
            }
        });

        let backend = DummyBackend::new(BLOCK);
        backend.set_input(input[0], vec![0.3; BLOCK]);
        backend.set_input(input[1], vec![0.2; BLOCK]);
        let order = [input, channel, master_in, master_out].concat();
        Self {
            router,
            tracks,
            backend,
            master: MasterBus {
                track: master_track,
                stereo_in: master_in,
                stereo_out: master_out,
            },
            track,
            channel,
            order,
        }
    }

    fn run(&mut self, bounce: BounceState) {
        let ctx = ProcessContext::new(self.router.config(), &self.tracks)
            .with_backend(&self.backend)
            .with_master(self.master)
            .with_bounce(bounce);
        assert!(self.router.run_cycle(&self.order, &ctx, 0, false).unwrap());
    }
}

fn bounce(with_parents: bool) -> BounceState {
    BounceState {
        mode: BounceMode::On,
        step: BounceStep::PostFader,
        with_parents,
    }
}

#[test]
fn regular_mix_reaches_master_when_not_bouncing() {
    let mut fx = BounceFixture::new();
    fx.run(BounceState::default());
    assert_all(&fx.router, &fx.channel[0], 0.3);
    assert_all(&fx.router, &fx.master.stereo_out[0], 0.3);
    assert_all(&fx.router, &fx.master.stereo_out[1], 0.2);
}

#[test]
fn solo_bounce_replaces_the_regular_mix() {
    let mut fx = BounceFixture::new();
    fx.run(bounce(false));
    assert_all(&fx.router, &fx.master.stereo_in[0], 0.0);
    assert_all(&fx.router, &fx.master.stereo_out[0], 0.3);
    assert_all(&fx.router, &fx.master.stereo_out[1], 0.2);
}

#[test]
fn bounce_with_parents_keeps_the_regular_mix() {
    let mut fx = BounceFixture::new();
    if let Some(state) = fx.tracks.get_mut(&fx.track) {
        state.bounce_to_master = false;
    }
    fx.run(bounce(true));
    assert_all(&fx.router, &fx.master.stereo_in[0], 0.3);
    assert_all(&fx.router, &fx.master.stereo_out[0], 0.3);
}

#[test]
fn stopped_recording_mutes_track_input() {
    let mut fx = BounceFixture::new();
    if let Some(state) = fx.tracks.get_mut(&fx.track) {
        state.recording = false;
    }
    fx.run(BounceState::default());
    assert_all(&fx.router, &fx.channel[0], 0.0);
    assert_all(&fx.router, &fx.master.stereo_out[0], 0.0);
}

#[test]
fn queued_midi_reaches_connected_ports() {
    let (mut router, lock) = router();
    let event = |label: &str, flow| {
        Port::new(
            PortIdentifier::new(label, PortType::Event, flow, PortOwner::Engine),
            BLOCK,
        )
    };
    let input = router.add_port(event("midi in", PortFlow::Input));
    let ch1 = router.add_port(event("ch1", PortFlow::Output).with_channel_mask(0b1));
    let ch2 = router.add_port(event("ch2", PortFlow::Output).with_channel_mask(0b10));
    lock.edit(|m| {
        m.add_connection(input, ch1, 1.0, false, true);
        m.add_connection(input, ch2, 1.0, false, true);
    });

    let queued = &router.midi_events(&input).unwrap().queued;
    queued.add_note_on(1, 64, 100, 5);
    queued.add_note_on(1, 60, 100, 2);
    queued.add_note_on(1, 67, 100, BLOCK as u32 + 3);

    let tracks = TrackTable::new();
    let ctx = ProcessContext::new(router.config(), &tracks);
    assert!(router.run_cycle(&[input, ch1, ch2], &ctx, 0, false).unwrap());

    let notes: Vec<(u8, u32)> = router
        .midi_events(&ch1)
        .unwrap()
        .active
        .events()
        .iter()
        .map(|ev| (ev.note_number(), ev.time))
        .collect();
    assert_eq!(notes, vec![(60, 2), (64, 5)]);
    assert!(router.midi_events(&ch2).unwrap().active.is_empty());
    assert_eq!(router.midi_events(&input).unwrap().queued.len(), 1);
}
