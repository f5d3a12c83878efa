use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Keeps `n` copies of `worker` running until `cancel` fires.
///
/// Slot ids `0..n` circulate through a channel. Every free slot immediately
/// spawns `worker(cancel, id)`; when that call returns the id goes back and
/// the slot is refilled. Once cancelled no new worker is spawned, and this
/// returns only after every running worker has finished.
///
/// Workers report nothing back; a panicking worker loses its slot, so
/// callers isolate panics inside `worker` (see `telemetry::capture_panic`).
pub async fn run_with_workers<F, Fut>(cancel: CancellationToken, n: usize, worker: F)
where
    F: Fn(CancellationToken, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if n == 0 {
        return;
    }

    let (slot_tx, mut slots) = mpsc::channel::<usize>(n);
    for id in 0..n {
        // Capacity is n, so seeding never blocks.
        let _ = slot_tx.try_send(id);
    }

    let worker = Arc::new(worker);
    let tracker = TaskTracker::new();
    let mut spawned: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            slot = slots.recv() => {
                let Some(id) = slot else { break };

                let worker = Arc::clone(&worker);
                let slot_tx = slot_tx.clone();
                let worker_cancel = cancel.clone();
                tracker.spawn(async move {
                    worker(worker_cancel, id).await;
                    // Receiver may be gone once the pool stopped spawning.
                    let _ = slot_tx.send(id).await;
                });
                spawned += 1;
            }
        }
    }

    tracker.close();
    debug!(in_flight = tracker.len(), spawned, "Worker pool draining");
    drop(slots);
    tracker.wait().await;
}
