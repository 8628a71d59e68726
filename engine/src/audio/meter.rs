use super::dsp;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Default meter ring size in samples.
pub const AUDIO_RING_SIZE: usize = 65536;
/// Blocks discarded at once when the writer catches up with the reader.
const OVERFLOW_SKIP_BLOCKS: usize = 8;
/// Peak-hold lifetime without a new peak.
pub const TIME_TO_RESET_PEAK_USECS: u64 = 4_800_000;
pub const PEAK_UNSET: f32 = -1.0;

/// Single-writer, single-reader circular buffer of metering samples.
///
/// The writer never waits: when the ring is full it advances the read
/// position past the oldest data and keeps going. Samples are stored as
/// `f32` bits in atomics so a lagging reader never observes a torn value.
#[derive(Debug)]
pub struct MeterRing {
    buffer: Box<[AtomicU32]>,
    mask: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

impl Default for MeterRing {
    fn default() -> Self {
        Self::new(AUDIO_RING_SIZE)
    }
}

impl MeterRing {
    /// Capacity is rounded up to a power of two.
    pub fn new(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(1).next_power_of_two();
        let buffer = (0..capacity)
            .map(|_| AtomicU32::new(0.0_f32.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            buffer,
            mask: capacity - 1,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn available_read(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    pub fn available_write(&self) -> usize {
        self.capacity() - self.available_read()
    }

    /// Writer side. Pushes a finished block, dropping the oldest
    /// `8 * block.len()` samples (or whatever is buffered) if there is not
    /// enough room.
    pub fn write_block(&self, block: &[f32]) {
        let block = &block[block.len().saturating_sub(self.capacity())..];
        let n = block.len();
        if n == 0 {
            return;
        }
        let write = self.write_pos.load(Ordering::Relaxed);
        let capacity = self.capacity();
        let _ = self
            .read_pos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |read| {
                let used = write.wrapping_sub(read);
                if capacity - used >= n {
                    return None;
                }
                Some(read.wrapping_add(used.min(n * OVERFLOW_SKIP_BLOCKS)))
            });

        for (i, sample) in block.iter().enumerate() {
            self.buffer[(write.wrapping_add(i)) & self.mask].store(sample.to_bits(), Ordering::Relaxed);
        }
        self.write_pos
            .store(write.wrapping_add(n), Ordering::Release);
    }

    /// Reader side. Consumes up to `out.len()` samples, oldest first, and
    /// returns how many were read.
    pub fn read(&self, out: &mut [f32]) -> usize {
        loop {
            let read = self.read_pos.load(Ordering::Acquire);
            let write = self.write_pos.load(Ordering::Acquire);
            let n = out.len().min(write.wrapping_sub(read));
            for (i, slot) in out[..n].iter_mut().enumerate() {
                *slot = f32::from_bits(
                    self.buffer[(read.wrapping_add(i)) & self.mask].load(Ordering::Relaxed),
                );
            }
            // a failed exchange means the writer skipped ahead under us
            if self
                .read_pos
                .compare_exchange(read, read.wrapping_add(n), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return n;
            }
        }
    }

    /// Drops everything currently buffered.
    pub fn clear(&self) {
        let write = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write, Ordering::Release);
    }
}

/// Decaying peak hold of a channel output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakMeter {
    peak: f32,
    timestamp_usecs: u64,
}

impl Default for PeakMeter {
    fn default() -> Self {
        Self {
            peak: PEAK_UNSET,
            timestamp_usecs: 0,
        }
    }
}

impl PeakMeter {
    /// Drops a held peak older than [`TIME_TO_RESET_PEAK_USECS`], then
    /// takes the block's absolute maximum if it is higher.
    pub fn update(&mut self, block: &[f32], now_usecs: u64) {
        if now_usecs.saturating_sub(self.timestamp_usecs) > TIME_TO_RESET_PEAK_USECS {
            self.peak = PEAK_UNSET;
        }
        if block.is_empty() {
            return;
        }
        let max = dsp::abs_max(block);
        if max > self.peak {
            self.peak = max;
            self.timestamp_usecs = now_usecs;
        }
    }

    /// `None` while no peak is held.
    pub fn peak(&self) -> Option<f32> {
        (self.peak >= 0.0).then_some(self.peak)
    }

    pub fn timestamp_usecs(&self) -> u64 {
        self.timestamp_usecs
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn overflow_skips_oldest_blocks() {
        let ring = MeterRing::new(64);
        for block in 0..16 {
            ring.write_block(&[block as f32; 4]);
        }
        assert_eq!(ring.available_read(), 64);
        // full ring: the next block drops the oldest eight blocks
        ring.write_block(&[16.0; 4]);
        assert_eq!(ring.available_read(), 64 - 32 + 4);

        let mut out = [0.0; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out, [8.0; 4]);
    }

    #[test]
    fn reader_sees_samples_in_order() {
        let ring = MeterRing::new(16);
        ring.write_block(&[1.0, 2.0, 3.0]);
        let mut out = [0.0; 8];
        assert_eq!(ring.read(&mut out), 3);
        assert_eq!(&out[..3], &[1.0, 2.0, 3.0]);
        assert_eq!(ring.read(&mut out), 0);
    }

    #[test]
    fn writer_never_blocks_on_a_slow_reader() {
        let ring = Arc::new(MeterRing::new(256));
        let writer = {
            let ring = ring.clone();
            thread::spawn(move || {
                for i in 0..10_000 {
                    ring.write_block(&[i as f32; 32]);
                }
            })
        };
        let mut out = [0.0; 32];
        for _ in 0..1000 {
            ring.read(&mut out);
        }
        writer.join().unwrap();
        assert!(ring.available_read() <= ring.capacity());
    }

    #[test]
    fn peak_resets_after_hold_time() {
        let mut meter = PeakMeter::default();
        assert_eq!(meter.peak(), None);
        meter.update(&[0.2, -0.8], 1_000);
        assert_eq!(meter.peak(), Some(0.8));
        meter.update(&[0.1], 1_000 + TIME_TO_RESET_PEAK_USECS);
        assert_eq!(meter.peak(), Some(0.8));
        meter.update(&[], 1_000 + TIME_TO_RESET_PEAK_USECS + 1);
        assert_eq!(meter.peak(), None);
        meter.update(&[0.1], 1_000 + TIME_TO_RESET_PEAK_USECS + 10);
        assert_eq!(meter.peak(), Some(0.1));
        assert_eq!(meter.timestamp_usecs(), 1_000 + TIME_TO_RESET_PEAK_USECS + 10);
    }
}
