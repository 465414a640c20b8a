//! Actor handles and the dispatcher seam.
//!
//! An [`Actor`] is a cloneable handle to one worker's mailbox. The pool owns
//! the worker; tiles and the assignment table only hold handles.

use super::message::{Envelope, WorkerMessage, WorkerReply};
use crate::error::SourceError;
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

/// Identifies a worker within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub usize);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Handle to a worker mailbox.
#[derive(Clone)]
pub struct Actor {
    id: ActorId,
    tx: mpsc::Sender<Envelope>,
}

impl Actor {
    pub fn new(id: ActorId, tx: mpsc::Sender<Envelope>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Returns true once the worker has shut down.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Enqueues a message and returns the channel its reply arrives on.
    ///
    /// Waits for mailbox capacity. Fails only if the worker is gone.
    pub async fn send(
        &self,
        message: WorkerMessage,
    ) -> Result<oneshot::Receiver<WorkerReply>, SourceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        trace!(actor = %self.id, message = %message, "Sending worker message");
        self.tx
            .send(Envelope::request(message, reply_tx))
            .await
            .map_err(|_| SourceError::Worker(format!("{} mailbox closed", self.id)))?;
        Ok(reply_rx)
    }

    /// Sends a message and waits for the worker's reply.
    ///
    /// A worker that drops the request without answering (it aborted the
    /// load) yields `Err(SourceError::Cancelled)`.
    pub async fn request(&self, message: WorkerMessage) -> WorkerReply {
        let reply = self.send(message).await?;
        reply.await.unwrap_or(Err(SourceError::Cancelled))
    }

    /// Fire-and-forget delivery for `AbortTile` / `RemoveTile`.
    ///
    /// Never blocks: when the mailbox is full the send is finished on a
    /// spawned task.
    pub fn notify(&self, message: WorkerMessage) {
        trace!(actor = %self.id, message = %message, "Notifying worker");
        match self.tx.try_send(Envelope::notification(message)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(envelope).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(envelope)) => {
                warn!(
                    actor = %self.id,
                    message = %envelope.message(),
                    "Worker mailbox closed, notification dropped"
                );
            }
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor").field("id", &self.id).finish()
    }
}

impl PartialEq for Actor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.tx.same_channel(&other.tx)
    }
}

impl Eq for Actor {}

/// Hands out worker actors.
///
/// `is_ready` turns true once workers can accept loads. Until then the
/// coordinator fetches tile bytes itself and only asks workers to decode.
pub trait Dispatcher: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Returns the next actor to assign work to.
    fn get_actor(&self) -> Actor;
}
