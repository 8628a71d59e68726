use super::vector::MidiEventVector;

/// Producer/consumer pair of event vectors belonging to one event port.
///
/// Producers fill `queued` at any time; the audio thread moves each block's
/// window into `active` with [`dequeue`](Self::dequeue), which is the only
/// hand-off between the two.
#[derive(Debug, Default)]
pub struct MidiEvents {
    pub queued: MidiEventVector,
    pub active: MidiEventVector,
}

impl MidiEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves queued events with time in `[offset, offset + nframes)` into
    /// `active` and returns how many moved. Events outside the window, or
    /// past the capacity of `active`, stay queued.
    pub fn dequeue(&self, offset: u32, nframes: u32) -> usize {
        self.queued.move_window_into(&self.active, offset, nframes)
    }

    pub fn clear_active(&self) {
        self.active.clear();
    }

    /// Queues all-notes-off on every channel for delivery at the start of
    /// the next block.
    pub fn panic(&self) {
        self.queued.panic();
    }
}
