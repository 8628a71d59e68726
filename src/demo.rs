use signalroute_engine::hw::DummyBackend;
use signalroute_engine::port::{
    Port, PortFlags, PortFlags2, PortFlow, PortId, PortIdentifier, PortOwner, PortType,
};
use signalroute_engine::{
    BounceState, EngineConfig, MasterBus, PortOperationLock, ProcessContext, Router, TrackKind,
    TrackState, TrackTable,
};
use std::f32::consts::TAU;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

type Stereo = [PortId; 2];

/// A generated stereo tone fed to a track's recording input.
struct Tone {
    inputs: Stereo,
    freq: f32,
    amp: f32,
}

/// Two audio tracks summed into a master, with the chain
/// input -> processor -> prefader -> fader -> channel on every track.
pub struct DemoSession {
    pub router: Router,
    pub tracks: TrackTable,
    pub master: MasterBus,
    /// Ports in processing order.
    pub order: Vec<PortId>,
    /// `(src, dest, multiplier)` edges to register through the control task.
    pub connections: Vec<(PortId, PortId, f32)>,
    tones: Vec<Tone>,
}

fn stereo(
    router: &mut Router,
    label: &str,
    flow: PortFlow,
    owner: PortOwner,
    flags2: PortFlags2,
) -> Stereo {
    let block_length = router.block_length();
    let mut add = |side: &str, flag: PortFlags| {
        router.add_port(Port::new(
            PortIdentifier::new(format!("{label} {side}"), PortType::Audio, flow, owner)
                .with_flags(flag)
                .with_flags2(flags2),
            block_length,
        ))
    };
    [add("L", PortFlags::STEREO_L), add("R", PortFlags::STEREO_R)]
}

fn link(connections: &mut Vec<(PortId, PortId, f32)>, src: Stereo, dest: Stereo, multiplier: f32) {
    for side in 0..2 {
        connections.push((src[side], dest[side], multiplier));
    }
}

impl DemoSession {
    pub fn new(config: EngineConfig, lock: Arc<PortOperationLock>) -> Self {
        let mut router = Router::new(config, lock);
        let mut tracks = TrackTable::new();
        let mut order = Vec::new();
        let mut connections = Vec::new();
        let mut tones = Vec::new();

        let master_track = Uuid::new_v4();
        tracks.insert(master_track, TrackState::new(TrackKind::Master));
        let master_in = stereo(
            &mut router,
            "Master Stereo In",
            PortFlow::Input,
            PortOwner::TrackProcessor {
                track: master_track,
            },
            PortFlags2::empty(),
        );
        let master_fader = stereo(
            &mut router,
            "Master Fader Out",
            PortFlow::Output,
            PortOwner::Fader {
                track: Some(master_track),
            },
            PortFlags2::POSTFADER,
        );
        let master_out = stereo(
            &mut router,
            "Master Stereo Out",
            PortFlow::Output,
            PortOwner::Channel {
                track: master_track,
            },
            PortFlags2::empty(),
        );
        for port in master_out {
            if let Some(port) = router.port_mut(&port) {
                port.exposed_to_backend = true;
            }
        }

        for (name, freq, amp, gain) in [("Bass", 110.0, 0.6, 0.8), ("Lead", 440.0, 0.4, 0.5)] {
            let track = Uuid::new_v4();
            let mut state = TrackState::new(TrackKind::Audio);
            state.recording = true;
            state.bounce = true;
            state.bounce_to_master = true;
            tracks.insert(track, state);

            let tp_in = stereo(
                &mut router,
                &format!("{name} Stereo In"),
                PortFlow::Input,
                PortOwner::TrackProcessor { track },
                PortFlags2::empty(),
            );
            let tp_out = stereo(
                &mut router,
                &format!("{name} Stereo Out"),
                PortFlow::Output,
                PortOwner::TrackProcessor { track },
                PortFlags2::empty(),
            );
            let prefader = stereo(
                &mut router,
                &format!("{name} Prefader Out"),
                PortFlow::Output,
                PortOwner::Fader { track: Some(track) },
                PortFlags2::PREFADER,
            );
            let fader = stereo(
                &mut router,
                &format!("{name} Fader Out"),
                PortFlow::Output,
                PortOwner::Fader { track: Some(track) },
                PortFlags2::POSTFADER,
            );
            let channel = stereo(
                &mut router,
                &format!("{name} Channel Out"),
                PortFlow::Output,
                PortOwner::Channel { track },
                PortFlags2::empty(),
            );

            link(&mut connections, tp_in, tp_out, 1.0);
            link(&mut connections, tp_out, prefader, 1.0);
            link(&mut connections, prefader, fader, gain);
            link(&mut connections, fader, channel, 1.0);
            link(&mut connections, channel, master_in, 1.0);
            for ports in [tp_in, tp_out, prefader, fader, channel] {
                order.extend(ports);
            }
            tones.push(Tone {
                inputs: tp_in,
                freq,
                amp,
            });
        }

        link(&mut connections, master_in, master_fader, 1.0);
        link(&mut connections, master_fader, master_out, 1.0);
        for ports in [master_in, master_fader, master_out] {
            order.extend(ports);
        }

        Self {
            router,
            tracks,
            master: MasterBus {
                track: master_track,
                stereo_in: master_in,
                stereo_out: master_out,
            },
            order,
            connections,
            tones,
        }
    }

    /// Taps every non-master track straight into the master while bouncing.
    pub fn set_bounce_to_master(&mut self, on: bool) {
        for state in self.tracks.values_mut() {
            if state.kind != TrackKind::Master {
                state.bounce_to_master = on;
            }
        }
    }

    /// Runs `frames` frames through the graph and returns the master output
    /// as interleaved stereo.
    pub fn render(&mut self, bounce: BounceState, frames: usize) -> Result<Vec<f32>, String> {
        let config = self.router.config();
        let block = config.block_length;
        let rate = config.sample_rate as f32;
        let backend = DummyBackend::new(block);
        for port in self.master.stereo_out {
            backend.register_output(port);
        }

        let mut samples = Vec::with_capacity(frames * 2);
        let mut start = 0;
        while start < frames {
            for tone in &self.tones {
                let wave: Vec<f32> = (start..start + block)
                    .map(|n| tone.amp * (TAU * tone.freq * n as f32 / rate).sin())
                    .collect();
                for port in tone.inputs {
                    backend.set_input(port, wave.clone());
                }
            }

            let ctx = ProcessContext::new(config, &self.tracks)
                .with_backend(&backend)
                .with_master(self.master)
                .with_bounce(bounce)
                .at(start as u64 * 1_000_000 / u64::from(config.sample_rate));
            let processed = self
                .router
                .run_cycle(&self.order, &ctx, start as u64, false)
                .map_err(|e| e.to_string())?;
            if !processed {
                warn!("block at frame {start} skipped");
            }

            let left = backend
                .output(self.master.stereo_out[0])
                .ok_or("master left output not captured")?;
            let right = backend
                .output(self.master.stereo_out[1])
                .ok_or("master right output not captured")?;
            let take = block.min(frames - start);
            for (l, r) in left.iter().zip(&right).take(take) {
                samples.push(*l);
                samples.push(*r);
            }
            start += block;
        }
        Ok(samples)
    }
}
