use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::{
    actor::{Actor, ActorError, StopReason},
    mailbox::BoundedMailbox,
};

/// Handle for sending messages to a running actor. Clones share the same
/// mailbox; the mailbox closes when the last clone is closed or dropped.
pub struct ActorRef<A: Actor> {
    sender: BoundedMailbox<A::Message>,
    kill: CancellationToken,
}

impl<A: Actor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            kill: self.kill.clone(),
        }
    }
}

impl<A: Actor> ActorRef<A> {
    pub(crate) fn new(sender: BoundedMailbox<A::Message>, kill: CancellationToken) -> Self {
        Self { sender, kill }
    }

    /// Queues a message, waiting while the mailbox is full.
    pub async fn tell(&self, message: A::Message) -> Result<(), ActorError> {
        self.sender.send(message).await
    }

    /// Stops the actor without draining its mailbox. Takes effect before the
    /// next queued message; a message already being handled completes.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }

    /// Gives up this reference. Once no reference is left the actor drains
    /// its mailbox and stops with [`StopReason::Closed`].
    pub fn close(self) {}
}

/// Resolves once the actor has stopped and released its state.
pub struct Termination {
    receiver: oneshot::Receiver<StopReason>,
}

impl Termination {
    pub(crate) fn new(receiver: oneshot::Receiver<StopReason>) -> Self {
        Self { receiver }
    }

    pub async fn acknowledged(self) -> Result<StopReason, ActorError> {
        Ok(self.receiver.await?)
    }
}
