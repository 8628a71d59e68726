use std::fmt;

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const POLY_AFTERTOUCH: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_AFTERTOUCH: u8 = 0xD0;
pub const PITCH_WHEEL: u8 = 0xE0;
pub const SYSTEM_MESSAGE: u8 = 0xF0;
pub const SONG_POSITION: u8 = 0xF2;
pub const CLOCK: u8 = 0xF8;
pub const START: u8 = 0xFA;
pub const CONTINUE: u8 = 0xFB;
pub const STOP: u8 = 0xFC;
pub const ACTIVE_SENSING: u8 = 0xFE;
pub const ALL_NOTES_OFF: u8 = 0x7B;

pub const DEFAULT_NOTE_OFF_VELOCITY: u8 = 90;
pub const DEFAULT_VELOCITY: u8 = 90;

/// Message class used to order events sharing a timestamp.
///
/// Variants are declared in precedence order: an earlier variant sorts
/// before a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MidiEventKind {
    NoteOn,
    NoteOff,
    AllNotesOff,
    Controller,
    Pitchbend,
    Start,
    Continue,
    SongPosition,
    Clock,
    Stop,
    Raw,
}

/// A short MIDI message stamped with its sample offset inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MidiEvent {
    raw: [u8; 3],
    size: u8,
    pub time: u32,
}

impl MidiEvent {
    pub fn new(b0: u8, b1: u8, b2: u8, time: u32) -> Self {
        Self {
            raw: [b0, b1, b2],
            size: 3,
            time,
        }
    }

    /// Builds an event from up to three raw bytes.
    pub fn from_bytes(bytes: &[u8], time: u32) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > 3 {
            return None;
        }
        let mut raw = [0_u8; 3];
        raw[..bytes.len()].copy_from_slice(bytes);
        Some(Self {
            raw,
            size: bytes.len() as u8,
            time,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.raw[..self.size as usize]
    }

    pub fn raw(&self) -> [u8; 3] {
        self.raw
    }

    pub fn status(&self) -> u8 {
        self.raw[0]
    }

    /// Zero-based channel nibble of the status byte.
    pub fn channel(&self) -> u8 {
        self.raw[0] & 0x0F
    }

    pub fn note_number(&self) -> u8 {
        self.raw[1]
    }

    pub fn velocity(&self) -> u8 {
        self.raw[2]
    }

    pub fn set_velocity(&mut self, velocity: u8) {
        self.raw[2] = velocity;
    }

    pub fn set_channel_nibble(&mut self, channel: u8) {
        self.raw[0] = (self.raw[0] & 0xF0) | (channel & 0x0F);
    }

    pub fn is_channel_voice(&self) -> bool {
        (0x80..SYSTEM_MESSAGE).contains(&self.raw[0])
    }

    pub fn is_note_on(&self) -> bool {
        self.raw[0] & 0xF0 == NOTE_ON && self.raw[2] > 0
    }

    /// Note-on with zero velocity counts as note-off.
    pub fn is_note_off(&self) -> bool {
        let kind = self.raw[0] & 0xF0;
        kind == NOTE_OFF || (kind == NOTE_ON && self.raw[2] == 0)
    }

    pub fn is_controller(&self) -> bool {
        self.raw[0] & 0xF0 == CONTROL_CHANGE
    }

    pub fn is_all_notes_off(&self) -> bool {
        self.is_controller() && self.raw[1] == ALL_NOTES_OFF
    }

    pub fn is_pitch_wheel(&self) -> bool {
        self.raw[0] & 0xF0 == PITCH_WHEEL
    }

    pub fn kind(&self) -> MidiEventKind {
        if self.is_note_off() {
            MidiEventKind::NoteOff
        } else if self.is_note_on() {
            MidiEventKind::NoteOn
        } else if self.is_all_notes_off() {
            MidiEventKind::AllNotesOff
        } else if self.is_pitch_wheel() {
            MidiEventKind::Pitchbend
        } else if self.is_controller() {
            MidiEventKind::Controller
        } else {
            match self.raw[0] {
                SONG_POSITION => MidiEventKind::SongPosition,
                START => MidiEventKind::Start,
                STOP => MidiEventKind::Stop,
                CONTINUE => MidiEventKind::Continue,
                CLOCK => MidiEventKind::Clock,
                _ => MidiEventKind::Raw,
            }
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} |", self.kind())?;
        for b in self.bytes() {
            write!(f, " {b:02X}")?;
        }
        write!(f, " | time: {}", self.time)
    }
}

/// Splits a 14-bit value into (LSB, MSB) data bytes.
pub fn split_14_bit(value: u16) -> (u8, u8) {
    ((value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8)
}

pub fn combine_14_bit(lsb: u8, msb: u8) -> u16 {
    ((msb as u16 & 0x7F) << 7) | (lsb as u16 & 0x7F)
}
