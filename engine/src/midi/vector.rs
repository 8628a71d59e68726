use super::chord::ChordDescriptor;
use super::event::{
    ALL_NOTES_OFF, CHANNEL_AFTERTOUCH, CONTROL_CHANGE, DEFAULT_NOTE_OFF_VELOCITY, MidiEvent,
    NOTE_OFF, NOTE_ON, PITCH_WHEEL, SONG_POSITION, split_14_bit,
};
use crate::hw::config;
use crate::mutex::SpinMutex;
use midly::{
    MidiMessage,
    live::{LiveEvent, SystemRealtime},
};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on events held by one vector in a block.
pub const MAX_MIDI_EVENTS: usize = 2560;

/// Extra capacity so a panic never reallocates, even on a full vector.
const PANIC_RESERVE: usize = 16;
/// Free slots chord expansion insists on before emitting more notes.
const CHORD_HEADROOM: usize = 6;
const DEDUP_FILTER_BITS: u32 = 12;
const DEDUP_FILTER_WORDS: usize = (1 << DEDUP_FILTER_BITS) / 64;
const PANIC_SPIN_LIMIT: usize = 1024;
const PANIC_BACKOFF: Duration = Duration::from_micros(10);

fn valid_channel(channel: u8) -> bool {
    (1..=16).contains(&channel)
}

fn in_window(ev: &MidiEvent, offset: u32, nframes: u32) -> bool {
    ev.time >= offset && ev.time < offset.saturating_add(nframes)
}

fn dedup_slot(ev: &MidiEvent) -> usize {
    let [b0, b1, b2] = ev.raw();
    let key = u64::from(b0) | u64::from(b1) << 8 | u64::from(b2) << 16 | u64::from(ev.time) << 24;
    (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> (64 - DEDUP_FILTER_BITS)) as usize
}

fn precedes(a: &MidiEvent, b: &MidiEvent) -> bool {
    (a.time, a.kind()) < (b.time, b.kind())
}

/// Bounded, spin-locked list of MIDI events shared between producers and
/// the audio thread.
#[derive(Debug)]
pub struct MidiEventVector {
    events: SpinMutex<Vec<MidiEvent>>,
}

impl Default for MidiEventVector {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiEventVector {
    pub fn new() -> Self {
        Self {
            events: SpinMutex::new(Vec::with_capacity(MAX_MIDI_EVENTS + PANIC_RESERVE)),
        }
    }

    fn push_locked(events: &mut Vec<MidiEvent>, ev: MidiEvent) -> bool {
        if events.len() >= MAX_MIDI_EVENTS {
            warn!("MIDI event vector full, dropping {ev}");
            return false;
        }
        events.push(ev);
        true
    }

    /// Appends `ev`; returns false when the vector is full and the event was
    /// dropped.
    pub fn push_back(&self, ev: MidiEvent) -> bool {
        Self::push_locked(&mut self.events.lock(), ev)
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn get(&self, index: usize) -> Option<MidiEvent> {
        self.events.lock().get(index).copied()
    }

    /// Copy of the current contents. Allocates; not for the audio thread.
    pub fn events(&self) -> Vec<MidiEvent> {
        self.events.lock().clone()
    }

    pub fn for_each(&self, mut f: impl FnMut(&MidiEvent)) {
        for ev in self.events.lock().iter() {
            f(ev);
        }
    }

    pub fn has_note_on(&self) -> bool {
        self.events.lock().iter().any(MidiEvent::is_note_on)
    }

    /// Removes every event matching `pred` and returns how many went.
    pub fn remove_if(&self, mut pred: impl FnMut(&MidiEvent) -> bool) -> usize {
        let mut events = self.events.lock();
        let before = events.len();
        events.retain(|ev| !pred(ev));
        before - events.len()
    }

    pub fn add_simple(&self, b0: u8, b1: u8, b2: u8, time: u32) -> bool {
        self.push_back(MidiEvent::new(b0, b1, b2, time))
    }

    pub fn add_note_on(&self, channel: u8, note: u8, velocity: u8, time: u32) {
        if !valid_channel(channel) || note > 127 || !(1..=127).contains(&velocity) {
            debug!("ignoring note on ch {channel} note {note} vel {velocity}");
            return;
        }
        self.add_simple(NOTE_ON | (channel - 1), note, velocity, time);
    }

    pub fn add_note_off(&self, channel: u8, note: u8, time: u32) {
        if !valid_channel(channel) || note > 127 {
            debug!("ignoring note off ch {channel} note {note}");
            return;
        }
        self.add_simple(
            NOTE_OFF | (channel - 1),
            note,
            DEFAULT_NOTE_OFF_VELOCITY,
            time,
        );
    }

    pub fn add_control_change(&self, channel: u8, controller: u8, value: u8, time: u32) {
        if !valid_channel(channel) || controller > 127 || value > 127 {
            debug!("ignoring control change ch {channel} cc {controller} value {value}");
            return;
        }
        self.add_simple(CONTROL_CHANGE | (channel - 1), controller, value, time);
    }

    pub fn add_pitchbend(&self, channel: u8, pitchbend: u16, time: u32) {
        if !valid_channel(channel) || pitchbend >= 0x4000 {
            debug!("ignoring pitchbend ch {channel} value {pitchbend}");
            return;
        }
        let (lsb, msb) = split_14_bit(pitchbend);
        self.add_simple(PITCH_WHEEL | (channel - 1), lsb, msb, time);
    }

    pub fn add_channel_pressure(&self, channel: u8, value: u8, time: u32) {
        if !valid_channel(channel) || value > 127 {
            debug!("ignoring channel pressure ch {channel} value {value}");
            return;
        }
        if let Some(ev) = MidiEvent::from_bytes(&[CHANNEL_AFTERTOUCH | (channel - 1), value], time) {
            self.push_back(ev);
        }
    }

    pub fn add_all_notes_off(&self, channel: u8, time: u32) {
        if !valid_channel(channel) {
            debug!("ignoring all notes off on ch {channel}");
            return;
        }
        self.add_simple(CONTROL_CHANGE | (channel - 1), ALL_NOTES_OFF, 0, time);
    }

    pub fn add_song_pos(&self, total_sixteenths: i64, time: u32) {
        let lsb = (total_sixteenths & 0x7F) as u8;
        let msb = ((total_sixteenths >> 7) & 0x7F) as u8;
        self.add_simple(SONG_POSITION, lsb, msb, time);
    }

    /// Adds a message of up to three bytes verbatim; longer buffers are
    /// logged and dropped.
    pub fn add_raw(&self, buf: &[u8], time: u32) -> bool {
        match MidiEvent::from_bytes(buf, time) {
            Some(ev) => self.push_back(ev),
            None => {
                warn!("dropping raw MIDI buffer of {} bytes", buf.len());
                false
            }
        }
    }

    /// Parses a message received from an external transport and adds it
    /// through the typed adders.
    pub fn add_event_from_buf(&self, time: u32, buf: &[u8]) {
        if buf.is_empty() || buf.len() > 3 {
            warn!("dropping malformed MIDI buffer of {} bytes", buf.len());
            return;
        }
        match LiveEvent::parse(buf) {
            Ok(LiveEvent::Midi { channel, message }) => {
                let ch = channel.as_int() + 1;
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                        self.add_note_off(ch, key.as_int(), time)
                    }
                    MidiMessage::NoteOn { key, vel } => {
                        self.add_note_on(ch, key.as_int(), vel.as_int(), time)
                    }
                    MidiMessage::NoteOff { key, .. } => self.add_note_off(ch, key.as_int(), time),
                    MidiMessage::PitchBend { bend } => {
                        self.add_pitchbend(ch, bend.0.as_int(), time)
                    }
                    MidiMessage::ChannelAftertouch { vel } => {
                        self.add_channel_pressure(ch, vel.as_int(), time)
                    }
                    MidiMessage::Controller { controller, value } => {
                        self.add_control_change(ch, controller.as_int(), value.as_int(), time)
                    }
                    _ => {
                        self.add_raw(buf, time);
                    }
                }
            }
            Ok(LiveEvent::Realtime(SystemRealtime::ActiveSensing)) => {}
            Ok(_) => {
                self.add_raw(buf, time);
            }
            Err(err) => {
                warn!("dropping unparsable MIDI buffer {buf:02X?}: {err}");
            }
        }
    }

    pub fn add_note_ons_from_chord(&self, chord: &ChordDescriptor, channel: u8, velocity: u8, time: u32) {
        for note in chord.notes() {
            self.add_note_on(channel, note, velocity, time);
        }
    }

    pub fn add_note_offs_from_chord(&self, chord: &ChordDescriptor, channel: u8, time: u32) {
        for note in chord.notes() {
            self.add_note_off(channel, note, time);
        }
    }

    /// Copies events of `src` with time in `[offset, offset + nframes)`.
    pub fn append(&self, src: &MidiEventVector, offset: u32, nframes: u32) {
        self.append_w_filter(src, None, offset, nframes);
    }

    /// Like [`append`](Self::append), additionally dropping channel-voice
    /// messages whose channel bit is not set in `channels` (bit 0 is
    /// channel 1). System messages always pass.
    pub fn append_w_filter(
        &self,
        src: &MidiEventVector,
        channels: Option<u16>,
        offset: u32,
        nframes: u32,
    ) {
        if std::ptr::eq(self, src) {
            return;
        }
        {
            let src_events = src.events.lock();
            let mut events = self.events.lock();
            for ev in src_events.iter() {
                if !in_window(ev, offset, nframes) {
                    if config::trace_midi() {
                        debug!(
                            "skipping event: time {} (local offset {offset} nframes {nframes})",
                            ev.time
                        );
                    }
                    continue;
                }
                let masked = channels
                    .is_some_and(|mask| ev.is_channel_voice() && mask & (1 << ev.channel()) == 0);
                if masked {
                    continue;
                }
                if !Self::push_locked(&mut events, *ev) {
                    break;
                }
            }
        }
        self.clear_duplicates();
    }

    /// Expands every note in the window of `src` into the chord `lookup`
    /// assigns to it, preserving timestamps. Notes without a chord are
    /// skipped.
    pub fn transform_chord_and_append(
        &self,
        src: &MidiEventVector,
        lookup: impl Fn(u8) -> Option<ChordDescriptor>,
        velocity: u8,
        offset: u32,
        nframes: u32,
    ) {
        if std::ptr::eq(self, src) {
            return;
        }
        {
            let src_events = src.events.lock();
            let mut events = self.events.lock();
            for ev in src_events.iter() {
                if !in_window(ev, offset, nframes) {
                    continue;
                }
                if events.len() >= MAX_MIDI_EVENTS - CHORD_HEADROOM {
                    warn!("no room left for chord notes, stopping expansion");
                    break;
                }
                let note_on = ev.is_note_on();
                if !note_on && !ev.is_note_off() {
                    continue;
                }
                let Some(chord) = lookup(ev.note_number()) else {
                    continue;
                };
                for note in chord.notes() {
                    let out = if note_on {
                        MidiEvent::new(NOTE_ON, note, velocity.clamp(1, 127), ev.time)
                    } else {
                        MidiEvent::new(NOTE_OFF, note, DEFAULT_NOTE_OFF_VELOCITY, ev.time)
                    };
                    if !Self::push_locked(&mut events, out) {
                        break;
                    }
                }
            }
        }
        self.clear_duplicates();
    }

    /// Removes events equal on `(raw bytes, time)` to an earlier one,
    /// keeping the first occurrence and the original order.
    pub fn clear_duplicates(&self) {
        Self::dedup_locked(&mut self.events.lock());
    }

    /// Order-preserving dedupe. A fixed bitset of seen hashes limits the
    /// linear look-back to events that may actually repeat.
    fn dedup_locked(events: &mut Vec<MidiEvent>) {
        let mut seen = [0_u64; DEDUP_FILTER_WORDS];
        let mut kept = 0;
        for i in 0..events.len() {
            let ev = events[i];
            let slot = dedup_slot(&ev);
            let (word, bit) = (slot / 64, 1_u64 << (slot % 64));
            if seen[word] & bit != 0 && events[..kept].contains(&ev) {
                continue;
            }
            seen[word] |= bit;
            events[kept] = ev;
            kept += 1;
        }
        events.truncate(kept);
    }

    /// Moves the events of `self` with time in `[offset, offset + nframes)`
    /// into `dst` under both locks, so concurrent pushes to `self` are
    /// either moved or left in place. Events that do not fit in `dst` stay
    /// behind for a later window. Returns how many were moved.
    pub(crate) fn move_window_into(&self, dst: &MidiEventVector, offset: u32, nframes: u32) -> usize {
        if std::ptr::eq(self, dst) {
            return 0;
        }
        let mut src = self.events.lock();
        let mut events = dst.events.lock();
        let mut kept = 0;
        let mut moved = 0;
        let mut overflow = 0;
        for i in 0..src.len() {
            let ev = src[i];
            if in_window(&ev, offset, nframes) {
                if events.len() < MAX_MIDI_EVENTS {
                    events.push(ev);
                    moved += 1;
                    continue;
                }
                overflow += 1;
            }
            src[kept] = ev;
            kept += 1;
        }
        src.truncate(kept);
        if overflow > 0 {
            warn!("MIDI event vector full, {overflow} events left queued");
        }
        Self::dedup_locked(&mut events);
        moved
    }

    /// Stable in-place sort by time, with simultaneous events ordered by
    /// [`MidiEventKind`](super::event::MidiEventKind) precedence.
    pub fn sort(&self) {
        let mut events = self.events.lock();
        for i in 1..events.len() {
            let mut j = i;
            while j > 0 && precedes(&events[j], &events[j - 1]) {
                events.swap(j, j - 1);
                j -= 1;
            }
        }
    }

    /// Rewrites the channel of every channel-voice message. `channel` is
    /// 1-based.
    pub fn set_channel(&self, channel: u8) {
        if !valid_channel(channel) {
            debug!("ignoring set_channel({channel})");
            return;
        }
        for ev in self.events.lock().iter_mut() {
            if ev.is_channel_voice() {
                ev.set_channel_nibble(channel - 1);
            }
        }
    }

    /// Queues all-notes-off on every channel.
    ///
    /// Meant for non-realtime callers: waits for the audio thread to release
    /// the vector, spinning first and then backing off in short sleeps.
    pub fn panic(&self) {
        let mut spins = 0;
        loop {
            if let Some(mut events) = self.events.try_lock() {
                Self::panic_without_lock(&mut events);
                return;
            }
            spins += 1;
            if spins < PANIC_SPIN_LIMIT {
                std::hint::spin_loop();
            } else {
                std::thread::sleep(PANIC_BACKOFF);
            }
        }
    }

    /// Pushes all-notes-off for channels 1..=16 onto an already locked
    /// event list. Bypasses the capacity limit so a panic always lands.
    pub fn panic_without_lock(events: &mut Vec<MidiEvent>) {
        for ch in 0..16_u8 {
            events.push(MidiEvent::new(CONTROL_CHANGE | ch, ALL_NOTES_OFF, 0, 0));
        }
    }
}
