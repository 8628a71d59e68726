use std::sync::OnceLock;

/// Logs every MIDI event skipped for falling outside the processed window.
pub const TRACE_MIDI_ENV: &str = "SIGNALROUTE_TRACE_MIDI";

/// Truthy spellings accepted for boolean switches, case-insensitive.
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Unset or non-unicode variables read as false.
pub fn env_flag(key: &str) -> bool {
    std::env::var(key).is_ok_and(|value| parse_flag(&value))
}

/// [`TRACE_MIDI_ENV`], read once per process.
pub fn trace_midi() -> bool {
    static TRACE_MIDI: OnceLock<bool> = OnceLock::new();
    *TRACE_MIDI.get_or_init(|| env_flag(TRACE_MIDI_ENV))
}

#[cfg(test)]
mod tests {
    use super::{env_flag, parse_flag};

    #[test]
    fn unset_flag_is_false() {
        assert!(!env_flag("SIGNALROUTE_TEST_FLAG_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn flag_spellings() {
        for on in ["1", "true", " Yes ", "ON"] {
            assert!(parse_flag(on), "{on:?}");
        }
        for off in ["", "0", "no", "enabled"] {
            assert!(!parse_flag(off), "{off:?}");
        }
    }
}
