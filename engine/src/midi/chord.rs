pub const CHORD_MAX_NOTES: usize = 48;
/// MIDI note of the first slot of a chord mask.
pub const CHORD_LOWEST_NOTE: u8 = 36;

/// Set of notes making up a chord, as a mask over four octaves starting at
/// [`CHORD_LOWEST_NOTE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordDescriptor {
    notes: [bool; CHORD_MAX_NOTES],
}

impl Default for ChordDescriptor {
    fn default() -> Self {
        Self {
            notes: [false; CHORD_MAX_NOTES],
        }
    }
}

impl ChordDescriptor {
    /// Builds a chord from absolute MIDI note numbers; notes outside the
    /// mask range are ignored.
    pub fn from_notes(notes: &[u8]) -> Self {
        let mut descr = Self::default();
        for &note in notes {
            descr.set(note, true);
        }
        descr
    }

    pub fn set(&mut self, note: u8, on: bool) {
        if let Some(slot) = Self::slot(note) {
            self.notes[slot] = on;
        }
    }

    pub fn contains(&self, note: u8) -> bool {
        Self::slot(note).is_some_and(|slot| self.notes[slot])
    }

    /// MIDI note numbers of the chord, lowest first.
    pub fn notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.notes
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(i, _)| CHORD_LOWEST_NOTE + i as u8)
    }

    pub fn len(&self) -> usize {
        self.notes.iter().filter(|on| **on).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(note: u8) -> Option<usize> {
        let slot = note.checked_sub(CHORD_LOWEST_NOTE)? as usize;
        (slot < CHORD_MAX_NOTES).then_some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_notes_in_range() {
        let chord = ChordDescriptor::from_notes(&[20, 48, 52, 55, 100]);
        assert_eq!(chord.notes().collect::<Vec<_>>(), vec![48, 52, 55]);
        assert!(chord.contains(52));
        assert!(!chord.contains(20));
    }
}
