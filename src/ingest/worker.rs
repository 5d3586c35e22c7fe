//! Node-keyed ingestion workers
//!
//! Each worker owns a bounded queue. A sample is routed by hashing its
//! node id, so every sample of one node goes through the same queue and is
//! scored in the order it was received. Different nodes spread over the
//! workers and proceed in parallel.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{GatewayError, Result};
use crate::ingest::IngestPipeline;
use crate::types::Sample;

/// Pool of threads running [`IngestPipeline::accept`]
pub struct IngestWorkerPool {
    senders: Vec<Sender<Sample>>,
    handles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for IngestWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestWorkerPool")
            .field("workers", &self.senders.len())
            .finish()
    }
}

impl IngestWorkerPool {
    /// Start `count` workers (at least one), each with a queue of
    /// `queue_capacity` samples
    pub fn spawn(
        pipeline: Arc<IngestPipeline>,
        count: usize,
        queue_capacity: usize,
    ) -> Result<Self> {
        let count = count.max(1);
        let mut senders = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for index in 0..count {
            let (tx, rx) = bounded(queue_capacity.max(1));
            let pipeline = pipeline.clone();
            let handle = thread::Builder::new()
                .name(format!("ingest-worker-{}", index))
                .spawn(move || worker_loop(index, pipeline, rx))
                .map_err(|e| GatewayError::from(e).with_context("Spawning ingest worker"))?;
            senders.push(tx);
            handles.push(handle);
        }

        tracing::info!("Started {} ingest workers", count);
        Ok(Self { senders, handles })
    }

    /// Number of workers
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Always false; a pool has at least one worker
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Index of the worker that handles `node_id`
    pub fn worker_for(&self, node_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        node_id.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    /// Queue a sample on its node's worker, blocking while that queue is full
    pub fn dispatch(&self, sample: Sample) -> Result<()> {
        let index = self.worker_for(sample.node_id());
        self.senders[index]
            .send(sample)
            .map_err(|_| GatewayError::Channel(format!("ingest worker {} has stopped", index)))
    }

    /// Close the queues and wait for the workers to drain them
    pub fn shutdown(self) {
        let Self { senders, handles } = self;
        drop(senders);
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("Ingest worker panicked");
            }
        }
        tracing::info!("Ingest workers stopped");
    }
}

fn worker_loop(index: usize, pipeline: Arc<IngestPipeline>, rx: Receiver<Sample>) {
    tracing::debug!("Ingest worker {} started", index);
    // Ends once every sender is dropped and the queue is empty
    for sample in rx.iter() {
        pipeline.accept(sample);
    }
    tracing::debug!("Ingest worker {} stopped", index);
}
