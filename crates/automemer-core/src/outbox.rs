//! Outbound message queue.
//!
//! Producers (release engine, command interpreter) hold a cloneable
//! [`Outbox`]; the delivery loop owns the single [`OutboxReceiver`] and
//! drains it one message per tick.

use crate::error::{Error, Result};
use crate::types::OutboundMessage;
use tokio::sync::mpsc;

/// Sending half of the outbound queue
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

/// Receiving half of the outbound queue
#[derive(Debug)]
pub struct OutboxReceiver {
    rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

/// Create a connected outbox pair.
pub fn channel() -> (Outbox, OutboxReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Outbox { tx }, OutboxReceiver { rx })
}

impl Outbox {
    pub fn send(&self, message: OutboundMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::Other("outbound queue closed".into()))
    }
}

impl OutboxReceiver {
    /// Next queued message, without waiting.
    pub fn try_recv(&mut self) -> Option<OutboundMessage> {
        self.rx.try_recv().ok()
    }

    /// Everything currently queued, in FIFO order.
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
