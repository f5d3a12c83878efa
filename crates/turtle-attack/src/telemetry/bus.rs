use super::{Event, EventHandler};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default capacity of the event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Moves event delivery off the worker tasks.
///
/// Events are queued in a bounded channel and forwarded, in enqueue order, to
/// the downstream handler by a single consumer task. A full queue holds the
/// producer back instead of dropping the event.
///
/// On a current-thread runtime the producer cannot be held back without
/// starving the consumer, so each overflowing event gets its own send task.
/// Those tasks wait on the channel in spawn order, which keeps delivery in
/// order, but their number is bounded only by how far producers outrun the
/// consumer. Use the multi-thread runtime when producers can burst.
///
/// `close` stops the consumer but leaves the queue open so late producers do
/// not fail; whatever arrives after that is never delivered. Dropping the
/// handler without closing it lets the consumer drain the queue and exit.
pub struct AsyncEventHandler {
    tx: mpsc::Sender<Event>,
    stop: CancellationToken,
}

impl AsyncEventHandler {
    /// Spawns the consumer task on the current tokio runtime.
    pub fn new<H>(handler: H, capacity: usize) -> Self
    where
        H: EventHandler + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Event>(capacity.max(1));
        let stop = CancellationToken::new();

        let consumer_stop = stop.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = consumer_stop.cancelled() => {
                        debug!("Event consumer stopped");
                        return;
                    }
                    event = rx.recv() => match event {
                        Some(event) => handler.handle_event(event),
                        None => {
                            debug!("Event queue drained, consumer exiting");
                            return;
                        }
                    }
                }
            }
        });

        Self { tx, stop }
    }

    /// Stops the consumer loop. Events still queued are not delivered.
    pub fn close(&self) {
        self.stop.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.stop.is_cancelled()
    }

    fn send_blocking(&self, event: Event) {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| {
                    handle.block_on(async {
                        tokio::select! {
                            _ = self.stop.cancelled() => {}
                            _ = self.tx.send(event) => {}
                        }
                    })
                });
            }
            Ok(handle) => {
                // Blocking here would also block the consumer sharing this thread.
                let tx = self.tx.clone();
                handle.spawn(async move {
                    let _ = tx.send(event).await;
                });
            }
            Err(_) => {
                let _ = self.tx.blocking_send(event);
            }
        }
    }
}

impl EventHandler for AsyncEventHandler {
    fn handle_event(&self, event: Event) {
        if self.stop.is_cancelled() {
            trace!(event = %event.name, "Event bus closed, dropping event");
            return;
        }

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => self.send_blocking(event),
            Err(TrySendError::Closed(event)) => {
                trace!(event = %event.name, "Event consumer gone, dropping event");
            }
        }
    }
}
