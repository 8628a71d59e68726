use crate::port::{ChannelMapping, PortId};
use tokio::sync::mpsc::Sender;

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Quit,
    Connect {
        src: PortId,
        dest: PortId,
        multiplier: f32,
        locked: bool,
        enabled: bool,
    },
    Disconnect {
        src: PortId,
        dest: PortId,
    },
    UpdateConnection {
        src: PortId,
        dest: PortId,
        multiplier: f32,
        locked: bool,
        enabled: bool,
    },
    SetChannelMap {
        src: PortId,
        dest: PortId,
        map: Option<Vec<ChannelMapping>>,
    },
    SetBipolar {
        src: PortId,
        dest: PortId,
        bipolar: bool,
    },
    DisconnectAll(PortId),
    /// Answered with the number of connections removed.
    DisconnectedAll(PortId, usize),
    ClearConnections,
    /// Answered with [`Action::Connections`].
    Snapshot,
    /// JSON snapshot of the connections manager.
    Connections(String),
    /// Replaces the whole graph with a JSON snapshot.
    LoadConnections(String),
}

#[derive(Clone, Debug)]
pub enum Message {
    Channel(Sender<Self>),

    Request(Action),
    Response(Result<Action, String>),
}
