//! Background embedding worker pool.
//!
//! N OS threads share one tiered queue behind a `Mutex` + `Condvar`. Each worker pops the
//! highest non-empty tier, embeds synchronously with its own handle on the provider and sends
//! the outcome through a tokio channel, so slow inference never runs on the async scheduler.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use anyhow::{Context, Result, anyhow};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::classify::EmbeddingRequest;
use super::provider::EmbeddingProvider;

/// Result of one request, delivered to the completion task
#[derive(Debug)]
pub struct EmbeddingCompletion {
    pub request: EmbeddingRequest,
    pub result: Result<Vec<f32>, String>,
}

/// Three FIFO tiers drained highest first.
#[derive(Debug, Default)]
pub struct TieredQueue {
    tiers: [VecDeque<EmbeddingRequest>; 3],
}

impl TieredQueue {
    pub fn push(&mut self, request: EmbeddingRequest) {
        self.tiers[request.priority.index()].push_back(request);
    }

    pub fn pop(&mut self) -> Option<EmbeddingRequest> {
        self.tiers.iter_mut().find_map(|tier| tier.pop_front())
    }

    /// Up to `max` requests in drain order
    pub fn pop_batch(&mut self, max: usize) -> Vec<EmbeddingRequest> {
        let mut batch = Vec::with_capacity(max.min(self.len()));
        while batch.len() < max {
            match self.pop() {
                Some(request) => batch.push(request),
                None => break,
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    pub fn clear(&mut self) -> usize {
        let dropped = self.len();
        for tier in &mut self.tiers {
            tier.clear();
        }
        dropped
    }
}

#[derive(Default)]
struct QueueState {
    queue: TieredQueue,
    shutdown: bool,
}

#[derive(Default)]
struct SharedQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl SharedQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Embedding queue mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

pub struct EmbeddingWorkerPool {
    queue: Arc<SharedQueue>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl EmbeddingWorkerPool {
    /// Warm the provider up with one call, then spawn `workers` threads.
    ///
    /// Fails when the warm-up call fails or a thread cannot be spawned; already spawned threads are
    /// stopped before returning the error.
    pub fn start(
        provider: Arc<dyn EmbeddingProvider>,
        workers: usize,
        completions: UnboundedSender<EmbeddingCompletion>,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(anyhow!("Worker pool needs at least one worker"));
        }

        provider
            .embed("marlin worker warm-up")
            .context("Embedding provider warm-up failed")?;

        let pool = Self {
            queue: Arc::new(SharedQueue::default()),
            workers: Mutex::new(Vec::with_capacity(workers)),
            size: workers,
        };

        for index in 0..workers {
            let queue = Arc::clone(&pool.queue);
            let provider = Arc::clone(&provider);
            let completions = completions.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("marlin-embed-{}", index))
                .spawn(move || worker_loop(queue, provider, completions));

            match spawned {
                Ok(handle) => pool.lock_workers().push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(anyhow!("Failed to spawn embedding worker {}: {}", index, e));
                }
            }
        }

        info!("🧵 Embedding worker pool started with {} workers", workers);
        Ok(pool)
    }

    pub fn submit(&self, request: EmbeddingRequest) {
        let mut state = self.queue.lock();
        if state.shutdown {
            return;
        }
        state.queue.push(request);
        drop(state);
        self.queue.ready.notify_one();
    }

    pub fn submit_batch(&self, requests: Vec<EmbeddingRequest>) {
        let mut state = self.queue.lock();
        if state.shutdown {
            return;
        }
        for request in requests {
            state.queue.push(request);
        }
        drop(state);
        self.queue.ready.notify_all();
    }

    /// Requests waiting for a worker
    pub fn pending(&self) -> usize {
        self.queue.lock().queue.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_running(&self) -> bool {
        !self.queue.lock().shutdown
    }

    /// Drop queued requests and join the workers. A request already being embedded finishes
    /// first; its completion may or may not still be delivered.
    pub fn shutdown(&self) {
        let dropped = {
            let mut state = self.queue.lock();
            state.shutdown = true;
            state.queue.clear()
        };
        self.queue.ready.notify_all();

        let handles: Vec<JoinHandle<()>> = self.lock_workers().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("Embedding worker panicked before shutdown");
            }
        }
        debug!("Embedding worker pool stopped ({} queued requests dropped)", dropped);
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn worker_loop(
    queue: Arc<SharedQueue>,
    provider: Arc<dyn EmbeddingProvider>,
    completions: UnboundedSender<EmbeddingCompletion>,
) {
    loop {
        let request = {
            let mut state = queue.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(request) = state.queue.pop() {
                    break request;
                }
                state = queue
                    .ready
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        };

        let result = provider.embed(&request.content).map_err(|e| e.to_string());
        if completions.send(EmbeddingCompletion { request, result }).is_err() {
            // Receiver gone: the indexer is shutting down
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::classify::{ArchitecturalLayer, Priority};

    fn request(id: &str, priority: Priority) -> EmbeddingRequest {
        EmbeddingRequest {
            symbol_id: id.to_string(),
            file_path: "a.rs".to_string(),
            content: id.to_string(),
            fingerprint: id.to_string(),
            layer: ArchitecturalLayer::Unknown,
            pattern_tags: Vec::new(),
            priority,
        }
    }

    #[test]
    fn tiers_drain_high_to_low_fifo_within_tier() {
        let mut queue = TieredQueue::default();
        queue.push(request("low", Priority::Low));
        queue.push(request("normal-1", Priority::Normal));
        queue.push(request("high", Priority::High));
        queue.push(request("normal-2", Priority::Normal));

        let order: Vec<String> = queue.pop_batch(10).into_iter().map(|r| r.symbol_id).collect();
        assert_eq!(order, vec!["high", "normal-1", "normal-2", "low"]);
        assert!(queue.is_empty());
    }
}
