use crate::port::PortId;
use thiserror::Error;

/// Internal-consistency failures detected while processing a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port {port} buffer holds {actual} samples, block length is {expected}")]
    BufferTooShort {
        port: PortId,
        expected: usize,
        actual: usize,
    },

    #[error("sub-range {offset}+{nframes} exceeds block length {block_length}")]
    RangeOutOfBlock {
        offset: usize,
        nframes: usize,
        block_length: usize,
    },

    #[error("unknown port {0}")]
    UnknownPort(PortId),

    #[error("port {0} has the wrong type for this operation")]
    WrongPortType(PortId),
}

/// Rejections of control-thread requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("connection {src} -> {dest} already exists or is a self-loop")]
    Duplicate { src: PortId, dest: PortId },

    #[error("connection {src} -> {dest} not found")]
    NotFound { src: PortId, dest: PortId },
}
