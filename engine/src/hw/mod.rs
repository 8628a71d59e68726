pub mod config;
pub mod dummy;
pub mod traits;

pub use dummy::DummyBackend;
pub use traits::AudioBackend;
