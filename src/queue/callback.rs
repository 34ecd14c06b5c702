//! One-shot send completion shared by queue producers and the dispatch path.

use crate::queue::error::{QueueError, QueueResult};
use crate::queue::message::QueueMsgMetadata;
use tokio::sync::oneshot;

/// Completion handle passed along with a send.
///
/// Both completion methods consume the callback so it fires exactly once.
/// Dropping it without completing is observed as [`QueueError::CallbackDropped`].
#[derive(Debug)]
pub struct QueueCallback {
    tx: oneshot::Sender<QueueResult<QueueMsgMetadata>>,
}

/// Receiving side of a [`QueueCallback`].
#[derive(Debug)]
pub struct QueueAck {
    rx: oneshot::Receiver<QueueResult<QueueMsgMetadata>>,
}

impl QueueCallback {
    pub fn channel() -> (Self, QueueAck) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, QueueAck { rx })
    }

    pub fn on_success(self, metadata: QueueMsgMetadata) {
        let _ = self.tx.send(Ok(metadata));
    }

    pub fn on_failure(self, err: QueueError) {
        let _ = self.tx.send(Err(err));
    }

    pub fn complete(self, result: QueueResult<QueueMsgMetadata>) {
        let _ = self.tx.send(result);
    }
}

impl QueueAck {
    /// Wait for the sender to complete the callback.
    pub async fn wait(self) -> QueueResult<QueueMsgMetadata> {
        self.rx.await.unwrap_or(Err(QueueError::CallbackDropped))
    }
}
