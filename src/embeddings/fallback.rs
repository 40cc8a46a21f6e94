//! In-process embedding, used when the worker pool cannot start.
//!
//! A single tokio task drains the same tiered queue in small batches, embedding synchronously
//! and yielding to the scheduler between batches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use super::classify::EmbeddingRequest;
use super::pool::{EmbeddingCompletion, TieredQueue};
use super::provider::EmbeddingProvider;

pub struct InProcessEmbedder {
    queue: Arc<Mutex<TieredQueue>>,
    wake: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl InProcessEmbedder {
    /// Spawn the draining task on the current runtime.
    pub fn start(
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        completions: UnboundedSender<EmbeddingCompletion>,
    ) -> Self {
        let queue = Arc::new(Mutex::new(TieredQueue::default()));
        let wake = Arc::new(Notify::new());
        let stopped = Arc::new(AtomicBool::new(false));
        let batch_size = batch_size.max(1);

        let task = {
            let queue = Arc::clone(&queue);
            let wake = Arc::clone(&wake);
            let stopped = Arc::clone(&stopped);
            tokio::spawn(async move {
                loop {
                    if stopped.load(Ordering::Acquire) {
                        break;
                    }
                    let batch = lock_queue(&queue).pop_batch(batch_size);
                    if batch.is_empty() {
                        wake.notified().await;
                        continue;
                    }

                    for request in batch {
                        let result = provider.embed(&request.content).map_err(|e| e.to_string());
                        if completions.send(EmbeddingCompletion { request, result }).is_err() {
                            return;
                        }
                    }
                    tokio::task::yield_now().await;
                }
                debug!("In-process embedder stopped");
            })
        };

        Self {
            queue,
            wake,
            stopped,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn submit_batch(&self, requests: Vec<EmbeddingRequest>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let mut queue = lock_queue(&self.queue);
        for request in requests {
            queue.push(request);
        }
        drop(queue);
        self.wake.notify_one();
    }

    pub fn pending(&self) -> usize {
        lock_queue(&self.queue).len()
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        lock_queue(&self.queue).clear();
        self.wake.notify_one();
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

fn lock_queue(queue: &Mutex<TieredQueue>) -> MutexGuard<'_, TieredQueue> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
