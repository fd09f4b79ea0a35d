use tokio::sync::mpsc;

use crate::actor::ActorError;

pub struct BoundedMailbox<M>(mpsc::Sender<M>);

impl<M> Clone for BoundedMailbox<M> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<M> BoundedMailbox<M> {
    /// Waits for a free slot if the mailbox is full.
    pub async fn send(&self, message: M) -> Result<(), ActorError> {
        self.0.send(message).await.map_err(|_| ActorError::Stopped)
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

pub struct BoundedMailboxReceiver<M>(mpsc::Receiver<M>);

impl<M> BoundedMailboxReceiver<M> {
    /// Yields `None` once every sender is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<M> {
        self.0.recv().await
    }
}

pub fn bounded_mailbox<M>(buffer: usize) -> (BoundedMailbox<M>, BoundedMailboxReceiver<M>) {
    let (tx, rx) = mpsc::channel(buffer);
    (BoundedMailbox(tx), BoundedMailboxReceiver(rx))
}
