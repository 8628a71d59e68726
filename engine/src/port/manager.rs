use super::{ChannelMapping, PortConnection, PortId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Registry of every connection in a project.
///
/// Connections are kept in registration order; mixes depend on that order
/// being stable, so removal never reorders the survivors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConnectionsManager {
    connections: Vec<PortConnection>,
}

impl PortConnectionsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `src -> dest`. Returns `None` for a self-loop or when the
    /// edge already exists.
    pub fn add_connection(
        &mut self,
        src: PortId,
        dest: PortId,
        multiplier: f32,
        locked: bool,
        enabled: bool,
    ) -> Option<&PortConnection> {
        if src == dest {
            debug!("refusing self-connection on {src}");
            return None;
        }
        if self.contains_connection(&src, &dest) {
            debug!("connection {src} -> {dest} already registered");
            return None;
        }
        self.connections
            .push(PortConnection::new(src, dest, multiplier, locked, enabled));
        self.connections.last()
    }

    pub fn remove_connection(&mut self, src: &PortId, dest: &PortId) -> bool {
        match self.connections.iter().position(|c| c.joins(src, dest)) {
            Some(idx) => {
                self.connections.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Drops every edge that starts or ends at `port` and returns how many
    /// were removed.
    pub fn remove_all_connections(&mut self, port: &PortId) -> usize {
        let before = self.connections.len();
        self.connections.retain(|c| !c.touches(port));
        before - self.connections.len()
    }

    pub fn get_connection(&self, src: &PortId, dest: &PortId) -> Option<&PortConnection> {
        self.connections.iter().find(|c| c.joins(src, dest))
    }

    pub fn contains_connection(&self, src: &PortId, dest: &PortId) -> bool {
        self.get_connection(src, dest).is_some()
    }

    /// Edits an existing edge in place.
    pub fn update_connection(
        &mut self,
        src: &PortId,
        dest: &PortId,
        multiplier: f32,
        locked: bool,
        enabled: bool,
    ) -> bool {
        match self.connections.iter_mut().find(|c| c.joins(src, dest)) {
            Some(conn) => {
                conn.update(multiplier, locked, enabled);
                true
            }
            None => false,
        }
    }

    pub fn set_connection_map(
        &mut self,
        src: &PortId,
        dest: &PortId,
        map: Option<Vec<ChannelMapping>>,
    ) -> bool {
        match self.connections.iter_mut().find(|c| c.joins(src, dest)) {
            Some(conn) => {
                conn.channel_map = map;
                true
            }
            None => false,
        }
    }

    pub fn set_bipolar(&mut self, src: &PortId, dest: &PortId, bipolar: bool) -> bool {
        match self.connections.iter_mut().find(|c| c.joins(src, dest)) {
            Some(conn) => {
                conn.bipolar = bipolar;
                true
            }
            None => false,
        }
    }

    /// Incoming edges of `dest`, in registration order.
    pub fn get_sources<'a>(&'a self, dest: &'a PortId) -> impl Iterator<Item = &'a PortConnection> + 'a {
        self.connections.iter().filter(move |c| c.dest == *dest)
    }

    /// Outgoing edges of `src`, in registration order.
    pub fn get_dests<'a>(&'a self, src: &'a PortId) -> impl Iterator<Item = &'a PortConnection> + 'a {
        self.connections.iter().filter(move |c| c.src == *src)
    }

    /// First incoming (`sources == true`) or outgoing edge of `port`.
    pub fn get_source_or_dest(&self, port: &PortId, sources: bool) -> Option<&PortConnection> {
        self.connections
            .iter()
            .find(|c| if sources { c.dest == *port } else { c.src == *port })
    }

    /// The editable subset of `port`'s edges: incoming ones when `sources`
    /// is true, outgoing ones otherwise, skipping locked edges.
    pub fn get_unlocked_sources_or_dests<'a>(
        &'a self,
        port: &'a PortId,
        sources: bool,
    ) -> impl Iterator<Item = &'a PortConnection> + 'a {
        self.connections.iter().filter(move |c| {
            !c.locked && if sources { c.dest == *port } else { c.src == *port }
        })
    }

    pub fn count_unlocked(&self, port: &PortId, sources: bool) -> usize {
        self.get_unlocked_sources_or_dests(port, sources).count()
    }

    pub fn connections(&self) -> &[PortConnection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn clear(&mut self) {
        self.connections.clear();
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
