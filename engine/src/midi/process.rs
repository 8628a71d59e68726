use crate::context::{ProcessContext, TimeInfo};
use crate::error::PortError;
use crate::port::{PortId, PortRegistry};
use tracing::error;

/// Computes the window of an event port: external input first (the port's
/// own queued events), then every enabled source's active events, then a
/// sort so consumers see them in delivery order.
pub fn process_events(
    registry: &PortRegistry,
    port_id: PortId,
    ctx: &ProcessContext<'_>,
    time: &TimeInfo,
    noroll: bool,
) -> Result<(), PortError> {
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
    let port = registry
        .get(&port_id)
        .ok_or(PortError::UnknownPort(port_id))?;
    let events = port
        .midi_events()
        .ok_or(PortError::WrongPortType(port_id))?;
    if noroll {
        return Ok(());
    }

    let offset = time.local_offset as u32;
    let nframes = time.nframes as u32;
    if port.takes_external_input(ctx.track(port.identifier().track())) {
        events.dequeue(offset, nframes);
    }

    for link in port.sources().iter().filter(|link| link.enabled) {
        let src = registry
            .get(&link.src)
            .and_then(|p| p.midi_events())
            .ok_or(PortError::WrongPortType(link.src))?;
        events
            .active
            .append_w_filter(&src.active, port.channel_mask, offset, nframes);
    }
    events.active.sort();
    Ok(())
}
