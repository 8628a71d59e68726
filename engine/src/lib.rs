pub mod audio;
pub mod context;
mod control;
pub mod error;
pub mod hw;
pub mod message;
pub mod midi;
pub mod mutex;
pub mod port;
pub mod router;

pub use context::{
    BounceMode, BounceState, BounceStep, EngineConfig, MasterBus, ProcessContext, TimeInfo,
    TrackKind, TrackState, TrackTable,
};
pub use error::{ControlError, PortError};
pub use router::{PortOperationLock, Router, RoutingTable};

use std::sync::Arc;
use tokio::sync::mpsc::{Sender, channel};
use tokio::task::JoinHandle;

/// Spawns the control task that owns topology edits on `lock`.
pub fn init(lock: Arc<PortOperationLock>) -> (Sender<message::Message>, JoinHandle<()>) {
    let (tx, rx) = channel::<message::Message>(32);
    let mut controller = control::Controller::new(rx, lock);
    let handle = tokio::spawn(async move {
        controller.work().await;
    });
    (tx.clone(), handle)
}
