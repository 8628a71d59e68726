use super::PortId;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Routes source channel `src` onto destination channel `dest` of a
/// multi-channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelMapping {
    pub src: u8,
    pub dest: u8,
}

/// Directed, weighted edge between two ports.
///
/// Two connections compare equal when they join the same `(src, dest)`
/// pair, whatever their parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConnection {
    pub src: PortId,
    pub dest: PortId,
    pub multiplier: f32,
    pub enabled: bool,
    /// Locked edges are skipped by automatic re-patching.
    pub locked: bool,
    /// Only meaningful for CV connections.
    pub bipolar: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_map: Option<Vec<ChannelMapping>>,
}

impl PortConnection {
    pub fn new(src: PortId, dest: PortId, multiplier: f32, locked: bool, enabled: bool) -> Self {
        Self {
            src,
            dest,
            multiplier,
            enabled,
            locked,
            bipolar: false,
            channel_map: None,
        }
    }

    pub fn joins(&self, src: &PortId, dest: &PortId) -> bool {
        self.src == *src && self.dest == *dest
    }

    pub fn touches(&self, port: &PortId) -> bool {
        self.src == *port || self.dest == *port
    }

    pub fn update(&mut self, multiplier: f32, locked: bool, enabled: bool) {
        self.multiplier = multiplier;
        self.locked = locked;
        self.enabled = enabled;
    }
}

impl PartialEq for PortConnection {
    fn eq(&self, other: &Self) -> bool {
        self.src == other.src && self.dest == other.dest
    }
}

impl Eq for PortConnection {}

impl Hash for PortConnection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.src.hash(state);
        self.dest.hash(state);
    }
}

/// The slice of a connection the destination port needs while processing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceLink {
    pub src: PortId,
    pub multiplier: f32,
    pub enabled: bool,
}

impl From<&PortConnection> for SourceLink {
    fn from(conn: &PortConnection) -> Self {
        Self {
            src: conn.src,
            multiplier: conn.multiplier,
            enabled: conn.enabled,
        }
    }
}
