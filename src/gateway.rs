//! Assembled gateway: pipeline, optional workers and listener

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::ingest::{IngestPipeline, IngestStats, IngestWorkerPool, TelemetryListener};
use crate::store::NodeStateStore;

/// A bound, ready-to-run gateway
#[derive(Debug)]
pub struct Gateway {
    listener: TelemetryListener,
}

impl Gateway {
    /// Build everything `config` describes and bind the socket
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let pipeline = Arc::new(IngestPipeline::from_config(config)?);
        let mut listener = TelemetryListener::bind(pipeline.clone(), &config.network)?;
        if config.workers.count > 0 {
            let pool = IngestWorkerPool::spawn(
                pipeline,
                config.workers.count,
                config.workers.queue_capacity,
            )?;
            listener = listener.with_workers(pool);
        }
        Ok(Self { listener })
    }

    /// Node state, shared with the ingestion threads
    pub fn store(&self) -> Arc<NodeStateStore> {
        self.listener.pipeline().store().clone()
    }

    /// Ingestion counters
    pub fn stats(&self) -> Arc<IngestStats> {
        self.listener.pipeline().stats().clone()
    }

    /// Store `false` to stop [`run`](Self::run)
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.listener.stop_handle()
    }

    /// Bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the receive loop on the calling thread until stopped
    pub fn run(self) -> Result<()> {
        self.listener.run()
    }
}
