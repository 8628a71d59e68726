pub mod chord;
pub mod event;
pub mod events;
pub mod process;
pub mod vector;

pub use chord::ChordDescriptor;
pub use event::{MidiEvent, MidiEventKind};
pub use events::MidiEvents;
pub use vector::{MAX_MIDI_EVENTS, MidiEventVector};
