pub mod connection;
pub mod identifier;
pub mod manager;
pub mod registry;

pub use connection::{ChannelMapping, PortConnection, SourceLink};
pub use identifier::{
    OwnerType, PluginSlot, PortFlags, PortFlags2, PortFlow, PortId, PortIdentifier, PortOwner,
    PortRole, PortType,
};
pub use manager::PortConnectionsManager;
pub use registry::{Port, PortData, PortRegistry};
