use std::panic::AssertUnwindSafe;

use actor::{Actor, StopReason, SupervisionStrategy};
use actor_ref::{ActorRef, Termination};
use futures::FutureExt;
use mailbox::bounded_mailbox;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub mod actor;
pub mod actor_ref;
pub mod mailbox;

/// Spawns `actor` on its own task with a mailbox holding up to `capacity`
/// messages. If a handler fails or panics, the actor is either resumed or
/// stopped according to `Actor::on_error()` / `Actor::on_panic()`.
pub fn run<A: Actor>(mut actor: A, capacity: usize) -> (ActorRef<A>, Termination) {
    let (tx, mut rx) = bounded_mailbox(capacity);
    let kill = CancellationToken::new();
    let (done_tx, done_rx) = oneshot::channel();
    let actor_ref = ActorRef::new(tx, kill.clone());

    // run actor
    tokio::spawn(async move {
        let reason = loop {
            let message = tokio::select! {
                biased;
                _ = kill.cancelled() => break StopReason::Killed,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break StopReason::Closed,
                },
            };
            // handle message
            let result = AssertUnwindSafe(actor.handle(message))
                .catch_unwind()
                .await;
            let strategy = match result {
                Ok(Ok(())) => continue,
                Ok(Err(why)) => actor.on_error(why),
                // handler paniced?
                Err(why) => {
                    log::error!("actor paniced: {:?}", why);
                    actor.on_panic(why)
                }
            };
            if strategy == SupervisionStrategy::Stop {
                break StopReason::Failed;
            }
        };

        actor.stopped(reason).await;
        drop(rx);
        drop(actor);
        if done_tx.send(reason).is_err() {
            log::debug!("actor stopped ({:?}) without anyone waiting", reason);
        }
    });

    (actor_ref, Termination::new(done_rx))
}
