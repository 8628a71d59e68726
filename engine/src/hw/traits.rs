use crate::port::PortId;

/// Narrow buffer get/put contract between ports and an audio backend.
///
/// Both calls work on the `[offset, offset + nframes)` window of a
/// block-sized buffer and must not allocate or block.
pub trait AudioBackend: Send + Sync {
    /// Adds the backend's incoming samples for `port` into `dst`.
    fn sum_input(&self, port: PortId, dst: &mut [f32], offset: usize, nframes: usize);

    /// Hands the finished samples of `port` to the backend.
    fn write_output(&self, port: PortId, src: &[f32], offset: usize, nframes: usize);
}
