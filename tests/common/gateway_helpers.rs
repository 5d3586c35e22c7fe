//! Running gateway construction helpers

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use telemetry_gateway::config::GatewayConfig;
use telemetry_gateway::ingest::IngestStats;
use telemetry_gateway::{Gateway, NodeStateStore};

/// A gateway running on a background thread, bound to an ephemeral loopback port
pub struct RunningGateway {
    pub addr: SocketAddr,
    pub store: Arc<NodeStateStore>,
    pub stats: Arc<IngestStats>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<telemetry_gateway::Result<()>>>,
}

impl RunningGateway {
    /// Stop the loop and wait for it (and any workers) to finish
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap().unwrap();
        }
    }
}

impl Drop for RunningGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Config bound to 127.0.0.1:0 with persistence off and a short receive timeout
pub fn loopback_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.network.listen_addr = "127.0.0.1:0".parse().unwrap();
    config.network.recv_timeout_ms = 20;
    config.persistence.enabled = false;
    config
}

/// Bind and start a gateway
pub fn start_gateway(config: &GatewayConfig) -> RunningGateway {
    let gateway = Gateway::from_config(config).unwrap();
    let addr = gateway.local_addr().unwrap();
    let store = gateway.store();
    let stats = gateway.stats();
    let stop = gateway.stop_handle();
    let handle = std::thread::spawn(move || gateway.run());
    RunningGateway {
        addr,
        store,
        stats,
        stop,
        handle: Some(handle),
    }
}

/// Unconnected client socket on loopback
pub fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").unwrap()
}
