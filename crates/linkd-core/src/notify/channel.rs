// # Channel Observer
//
// Observer backed by a bounded tokio mpsc channel. Delivery uses `try_send`,
// so the dispatcher never waits on a slow consumer: a full queue drops the
// event for this observer only.

use tokio::sync::mpsc::{self, error::TrySendError};

use super::{DeliveryError, Observer, PropertiesChanged};

/// Observer that forwards events into a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<PropertiesChanged>,
}

impl ChannelObserver {
    /// Create an observer and the receiver it feeds
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PropertiesChanged>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Observer for ChannelObserver {
    fn deliver(&self, event: &PropertiesChanged) -> Result<(), DeliveryError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
