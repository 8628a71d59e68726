pub mod dsp;
pub mod meter;
pub mod process;

pub use meter::{MeterRing, PeakMeter};
