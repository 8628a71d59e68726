use crate::error::ControlError;
use crate::message::{Action, Message};
use crate::port::PortConnectionsManager;
use crate::router::PortOperationLock;
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{debug, error, info};

/// Non-realtime side of the engine: applies topology requests under the
/// port operation lock and reports the outcome to every registered client.
pub struct Controller {
    rx: Receiver<Message>,
    clients: Vec<Sender<Message>>,
    lock: Arc<PortOperationLock>,
}

impl Controller {
    pub fn new(rx: Receiver<Message>, lock: Arc<PortOperationLock>) -> Self {
        Self {
            rx,
            clients: vec![],
            lock,
        }
    }

    async fn notify_clients(&self, action: Result<Action, String>) {
        for client in &self.clients {
            if let Err(e) = client.send(Message::Response(action.clone())).await {
                error!("Error sending response to client: {e}");
            }
        }
    }

    fn handle_request(&mut self, a: Action) -> Result<Action, String> {
        match a {
            Action::Connect {
                src,
                dest,
                multiplier,
                locked,
                enabled,
            } => {
                let added = self.lock.edit(|connections| {
                    connections
                        .add_connection(src, dest, multiplier, locked, enabled)
                        .is_some()
                });
                if !added {
                    return Err(ControlError::Duplicate { src, dest }.to_string());
                }
                Ok(a)
            }
            Action::Disconnect { src, dest } => {
                if !self
                    .lock
                    .edit(|connections| connections.remove_connection(&src, &dest))
                {
                    return Err(ControlError::NotFound { src, dest }.to_string());
                }
                Ok(a)
            }
            Action::UpdateConnection {
                src,
                dest,
                multiplier,
                locked,
                enabled,
            } => {
                let updated = self.lock.edit(|connections| {
                    connections.update_connection(&src, &dest, multiplier, locked, enabled)
                });
                if !updated {
                    return Err(ControlError::NotFound { src, dest }.to_string());
                }
                Ok(a)
            }
            Action::SetChannelMap {
                src,
                dest,
                ref map,
            } => {
                let map = map.clone();
                if !self
                    .lock
                    .edit(|connections| connections.set_connection_map(&src, &dest, map))
                {
                    return Err(ControlError::NotFound { src, dest }.to_string());
                }
                Ok(a)
            }
            Action::SetBipolar { src, dest, bipolar } => {
                if !self
                    .lock
                    .edit(|connections| connections.set_bipolar(&src, &dest, bipolar))
                {
                    return Err(ControlError::NotFound { src, dest }.to_string());
                }
                Ok(a)
            }
            Action::DisconnectAll(port) => {
                let removed = self
                    .lock
                    .edit(|connections| connections.remove_all_connections(&port));
                Ok(Action::DisconnectedAll(port, removed))
            }
            Action::ClearConnections => {
                self.lock.edit(PortConnectionsManager::clear);
                Ok(a)
            }
            Action::Snapshot => self
                .lock
                .read(PortConnectionsManager::to_json)
                .map(Action::Connections)
                .map_err(|e| e.to_string()),
            Action::LoadConnections(ref json) => {
                let loaded = PortConnectionsManager::from_json(json).map_err(|e| e.to_string())?;
                info!("loaded {} connections", loaded.len());
                self.lock.edit(|connections| *connections = loaded);
                Ok(a)
            }
            Action::Quit
            | Action::DisconnectedAll(..)
            | Action::Connections(_) => Ok(a),
        }
    }

    pub async fn work(&mut self) {
        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Channel(s) => {
                    self.clients.push(s);
                }
                Message::Request(Action::Quit) => {
                    self.notify_clients(Ok(Action::Quit)).await;
                    return;
                }
                Message::Request(a) => {
                    let result = self.handle_request(a);
                    if let Err(e) = &result {
                        debug!("request rejected: {e}");
                    }
                    self.notify_clients(result).await;
                }
                Message::Response(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortId;
    use tokio::sync::mpsc::channel;

    async fn request(tx: &Sender<Message>, rx: &mut Receiver<Message>, a: Action) -> Result<Action, String> {
        tx.send(Message::Request(a)).await.unwrap();
        match rx.recv().await.unwrap() {
            Message::Response(result) => result,
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn applies_requests_under_the_lock() {
        let lock = Arc::new(PortOperationLock::default());
        let (tx, handle) = crate::init(lock.clone());
        let (client_tx, mut client_rx) = channel::<Message>(8);
        tx.send(Message::Channel(client_tx)).await.unwrap();

        let (a, b) = (PortId::new(), PortId::new());
        let connect = Action::Connect {
            src: a,
            dest: b,
            multiplier: 0.5,
            locked: false,
            enabled: true,
        };
        let before = lock.generation();
        assert_eq!(request(&tx, &mut client_rx, connect.clone()).await, Ok(connect.clone()));
        assert!(lock.generation() > before);
        assert!(request(&tx, &mut client_rx, connect).await.is_err());
        assert!(
            request(&tx, &mut client_rx, Action::Disconnect { src: b, dest: a })
                .await
                .is_err()
        );

        let Ok(Action::Connections(json)) = request(&tx, &mut client_rx, Action::Snapshot).await
        else {
            panic!("snapshot failed");
        };
        assert_eq!(
            request(&tx, &mut client_rx, Action::DisconnectAll(a)).await,
            Ok(Action::DisconnectedAll(a, 1))
        );
        assert!(lock.read(|m| m.is_empty()));
        request(&tx, &mut client_rx, Action::LoadConnections(json))
            .await
            .unwrap();
        assert!(lock.read(|m| m.contains_connection(&a, &b)));

        request(&tx, &mut client_rx, Action::Quit).await.unwrap();
        handle.await.unwrap();
    }
}
