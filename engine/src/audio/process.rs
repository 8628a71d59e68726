use super::dsp;
use crate::context::{BounceStep, ProcessContext, TimeInfo, TrackKind, TrackState};
use crate::error::PortError;
use crate::port::{
    OwnerType, PluginSlot, PortData, PortId, PortOwner, PortRegistry, PortRole, PortType,
};
use std::ops::Range;
use tracing::error;

/// Multipliers this close to unity are summed without scaling.
pub const MULTIPLIER_EPSILON: f32 = 1e-5;
/// Ceiling applied to fader and CV destinations after mixing.
pub const SAFETY_CLIP: f32 = 2.0;

/// Computes the `[local_offset, local_offset + nframes)` window of an audio
/// or CV port.
///
/// The port's buffer is detached for the duration of the call so sources
/// and the master bus can be reached through the registry.
pub fn process_signal(
    registry: &mut PortRegistry,
    port_id: PortId,
    ctx: &ProcessContext<'_>,
    time: &TimeInfo,
    noroll: bool,
) -> Result<(), PortError> {
    let Some(idx) = registry.index_of(&port_id) else {
        error!("process: unknown port {port_id}");
        return Err(PortError::UnknownPort(port_id));
    };
    let block_length = ctx.config.block_length;
    if time.end() > block_length {
        error!(
            "process: window {}+{} past block length {block_length} on {port_id}",
            time.local_offset, time.nframes
        );
        return Err(PortError::RangeOutOfBlock {
            offset: time.local_offset,
            nframes: time.nframes,
            block_length,
        });
    }

    let mut buf = match &mut registry.port_at_mut(idx).data {
        PortData::Signal(buf) => std::mem::take(buf),
        _ => return Err(PortError::WrongPortType(port_id)),
    };
    let result = process_detached(registry, idx, &mut buf, ctx, time, noroll);
    if let PortData::Signal(slot) = &mut registry.port_at_mut(idx).data {
        *slot = buf;
    }
    if let Err(err) = &result {
        error!("process: {err}");
    }
    result
}

fn process_detached(
    registry: &mut PortRegistry,
    idx: usize,
    buf: &mut [f32],
    ctx: &ProcessContext<'_>,
    time: &TimeInfo,
    noroll: bool,
) -> Result<(), PortError> {
    let block_length = ctx.config.block_length;
    let port_id = registry.port_at(idx).id();
    if buf.len() < block_length {
        return Err(PortError::BufferTooShort {
            port: port_id,
            expected: block_length,
            actual: buf.len(),
        });
    }
    let range = time.local_offset..time.end();

    if noroll {
        dsp::fill(&mut buf[range], ctx.config.denormal);
        return Ok(());
    }

    let port = registry.port_at(idx);
    let role = port.identifier().role();
    let track = ctx.track(role.owner.track());

    if port.takes_external_input(track) {
        if let Some(backend) = ctx.backend {
            backend.sum_input(port_id, buf, time.local_offset, time.nframes);
        }
    }

    mix_sources(registry, idx, buf, range.clone(), block_length)?;

    let is_cv = role.port_type == PortType::CV;
    if (is_cv || role.owner_type() == OwnerType::Fader)
        && dsp::abs_max(&buf[range.clone()]) > SAFETY_CLIP
    {
        dsp::limit(&mut buf[range.clone()], -SAFETY_CLIP, SAFETY_CLIP);
    }

    let port = registry.port_at(idx);
    if role.is_output() && port.exposed_to_backend {
        if let Some(backend) = ctx.backend {
            backend.write_output(port_id, buf, time.local_offset, time.nframes);
        }
    }

    if time.end() == block_length {
        if let Some(meter) = port.meter() {
            meter.write_block(&buf[..block_length]);
        }
    }

    if role.is_stereo() && role.is_output() && role.owner_type() == OwnerType::Channel {
        registry
            .port_at_mut(idx)
            .peak
            .update(&buf[range.clone()], ctx.timestamp_usecs);
    }

    let Some(master) = ctx.master.filter(|_| ctx.bounce.is_active()) else {
        return Ok(());
    };
    // solo bounce: keep the regular mix out of the master
    if !ctx.bounce.with_parents && master.stereo_in.contains(&port_id) {
        dsp::fill(&mut buf[range.clone()], ctx.config.denormal);
    }
    if let Some(side) = bounce_tap(&role, track, ctx.bounce.step) {
        let target = master.stereo_out[side];
        if target == port_id {
            return Ok(());
        }
        match registry.get_mut(&target).and_then(|p| p.buffer_mut()) {
            Some(out) if out.len() >= range.end => {
                dsp::add2(&mut out[range.clone()], &buf[range]);
            }
            _ => {
                return Err(PortError::WrongPortType(target));
            }
        }
    }

    Ok(())
}

fn mix_sources(
    registry: &PortRegistry,
    idx: usize,
    buf: &mut [f32],
    range: Range<usize>,
    block_length: usize,
) -> Result<(), PortError> {
    let port = registry.port_at(idx);
    let depth_range = if port.identifier().port_type() == PortType::CV {
        (port.maxf - port.minf) * 0.5
    } else {
        1.0
    };

    for link in port.sources().iter().filter(|link| link.enabled) {
        let src = registry
            .get(&link.src)
            .ok_or(PortError::UnknownPort(link.src))?
            .buffer()
            .ok_or(PortError::WrongPortType(link.src))?;
        if src.len() < block_length {
            return Err(PortError::BufferTooShort {
                port: link.src,
                expected: block_length,
                actual: src.len(),
            });
        }
        let multiplier = depth_range * link.multiplier;
        if (multiplier - 1.0).abs() < MULTIPLIER_EPSILON {
            dsp::add2(&mut buf[range.clone()], &src[range.clone()]);
        } else {
            dsp::mix2(&mut buf[range.clone()], &src[range.clone()], multiplier);
        }
    }
    Ok(())
}

/// Master output channel (0 = left, 1 = right) this port feeds while
/// bouncing, if any.
fn bounce_tap(role: &PortRole, track: Option<&TrackState>, step: BounceStep) -> Option<usize> {
    if !role.is_output() {
        return None;
    }
    let side = role.stereo_side()?;
    let track = track.filter(|t| t.bounce_to_master)?;
    let tapped = match (step, role.owner) {
        (
            BounceStep::BeforeInserts,
            PortOwner::Plugin {
                slot: PluginSlot::Instrument,
                ..
            },
        ) => track.kind == TrackKind::Instrument,
        (BounceStep::BeforeInserts, PortOwner::TrackProcessor { .. }) => {
            track.kind != TrackKind::Instrument && track.bounce
        }
        (BounceStep::PreFader, PortOwner::Fader { .. }) => role.is_prefader(),
        (BounceStep::PostFader, PortOwner::Channel { .. }) => track.kind != TrackKind::Master,
        _ => false,
    };
    tapped.then_some(side)
}
