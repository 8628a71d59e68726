use super::traits::AudioBackend;
use crate::audio::dsp;
use crate::mutex::SpinMutex;
use crate::port::PortId;
use std::collections::HashMap;
use tracing::debug;

/// In-memory backend: inputs are fixed block-sized buffers replayed every
/// cycle, outputs are captured into per-port buffers.
#[derive(Debug, Default)]
pub struct DummyBackend {
    block_length: usize,
    inputs: SpinMutex<HashMap<PortId, Vec<f32>>>,
    outputs: SpinMutex<HashMap<PortId, Vec<f32>>>,
}

impl DummyBackend {
    pub fn new(block_length: usize) -> Self {
        Self {
            block_length,
            ..Self::default()
        }
    }

    pub fn block_length(&self) -> usize {
        self.block_length
    }

    /// Sets the samples `port` receives each block. Shorter buffers are
    /// padded with silence.
    pub fn set_input(&self, port: PortId, mut samples: Vec<f32>) {
        samples.resize(self.block_length, 0.0);
        self.inputs.lock().insert(port, samples);
    }

    /// Allocates a capture buffer for `port`; writes to ports that were
    /// never registered are ignored.
    pub fn register_output(&self, port: PortId) {
        self.outputs
            .lock()
            .insert(port, vec![0.0; self.block_length]);
    }

    pub fn output(&self, port: PortId) -> Option<Vec<f32>> {
        self.outputs.lock().get(&port).cloned()
    }
}

impl AudioBackend for DummyBackend {
    fn sum_input(&self, port: PortId, dst: &mut [f32], offset: usize, nframes: usize) {
        let inputs = self.inputs.lock();
        let Some(src) = inputs.get(&port) else {
            return;
        };
        let end = (offset + nframes).min(src.len()).min(dst.len());
        if offset >= end {
            return;
        }
        dsp::add2(&mut dst[offset..end], &src[offset..end]);
    }

    fn write_output(&self, port: PortId, src: &[f32], offset: usize, nframes: usize) {
        let mut outputs = self.outputs.lock();
        let Some(dst) = outputs.get_mut(&port) else {
            debug!("dummy backend: no capture buffer for {port}");
            return;
        };
        let end = (offset + nframes).min(src.len()).min(dst.len());
        if offset >= end {
            return;
        }
        dst[offset..end].copy_from_slice(&src[offset..end]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_inputs_and_captures_outputs() {
        let backend = DummyBackend::new(4);
        let port = PortId::new();
        backend.set_input(port, vec![1.0, 2.0]);
        backend.register_output(port);

        let mut buf = vec![0.5; 4];
        backend.sum_input(port, &mut buf, 1, 3);
        assert_eq!(buf, vec![0.5, 2.5, 0.5, 0.5]);

        backend.write_output(port, &buf, 0, 2);
        assert_eq!(backend.output(port).unwrap(), vec![0.5, 2.5, 0.0, 0.0]);
        assert!(backend.output(PortId::new()).is_none());
    }
}
