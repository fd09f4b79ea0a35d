use core::fmt;
use std::{any::Any, error::Error};

use async_trait::async_trait;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionStrategy {
    Resume,
    Stop,
}

/// Why an actor's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every reference was closed and the mailbox was drained.
    Closed,
    /// The kill token fired. Queued messages were dropped.
    Killed,
    /// A handler failed or panicked and supervision chose to stop.
    Failed,
}

#[async_trait]
pub trait Actor: Send + 'static {
    type Message: Send + 'static;
    type Error: fmt::Debug + Send;

    async fn handle(&mut self, message: Self::Message) -> Result<(), Self::Error>;

    /// Called once after the loop ends, before the termination is acknowledged.
    #[allow(unused_variables)]
    async fn stopped(&mut self, reason: StopReason) {}

    /// Called when `handle` returns an error.
    fn on_error(&mut self, error: Self::Error) -> SupervisionStrategy {
        log::error!("actor failed: {:?}", error);
        SupervisionStrategy::Stop
    }

    /// Called when a handler panics.
    /// NOTE: If this method panics, the actor can not recover from the panic.
    #[allow(unused_variables)]
    fn on_panic(&mut self, error: Box<dyn Any + Send>) -> SupervisionStrategy {
        SupervisionStrategy::Stop
    }
}

#[derive(Debug)]
pub enum ActorError {
    /// The actor's mailbox is closed, it does not accept messages anymore.
    Stopped,
    /// The actor's task went away without acknowledging its termination.
    AcknowledgementLost(oneshot::error::RecvError),
}

impl fmt::Display for ActorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "actor stopped"),
            Self::AcknowledgementLost(why) => {
                write!(f, "actor termination not acknowledged: {}", why)
            }
        }
    }
}

impl Error for ActorError {}

impl From<oneshot::error::RecvError> for ActorError {
    fn from(why: oneshot::error::RecvError) -> Self {
        Self::AcknowledgementLost(why)
    }
}
