//! UDP receive loop

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::{GatewayError, Result};
use crate::ingest::{IngestPipeline, IngestWorkerPool};

/// Bound telemetry socket plus the loop that drains it
///
/// The socket read times out every `recv_timeout_ms` so the loop can notice
/// a cleared [`stop_handle`](Self::stop_handle) without any traffic arriving.
pub struct TelemetryListener {
    socket: UdpSocket,
    pipeline: Arc<IngestPipeline>,
    workers: Option<IngestWorkerPool>,
    running: Arc<AtomicBool>,
    max_datagram: usize,
    recv_timeout: Duration,
}

/// How the loop reacts to a failed receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecvFailure {
    /// The read timed out with nothing to do
    Idle,
    /// A socket error; the loop waits one receive timeout before retrying
    Backoff,
}

fn classify_recv_error(kind: ErrorKind) -> RecvFailure {
    match kind {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => RecvFailure::Idle,
        _ => RecvFailure::Backoff,
    }
}

impl std::fmt::Debug for TelemetryListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryListener")
            .field("local_addr", &self.socket.local_addr().ok())
            .field("workers", &self.workers)
            .field("max_datagram", &self.max_datagram)
            .finish()
    }
}

impl TelemetryListener {
    /// Bind `network.listen_addr`. This is the only gateway step whose
    /// failure is fatal.
    pub fn bind(pipeline: Arc<IngestPipeline>, network: &NetworkConfig) -> Result<Self> {
        let addr = network.listen_addr;
        let socket = UdpSocket::bind(addr).map_err(|source| GatewayError::Bind { addr, source })?;
        let recv_timeout = Duration::from_millis(network.recv_timeout_ms.max(1));
        socket.set_read_timeout(Some(recv_timeout))?;

        let local = socket.local_addr()?;
        tracing::info!("Telemetry listener bound to {}", local);

        Ok(Self {
            socket,
            pipeline,
            workers: None,
            running: Arc::new(AtomicBool::new(true)),
            max_datagram: network.max_datagram,
            recv_timeout,
        })
    }

    /// Hand accepted samples to a worker pool instead of processing them
    /// on the receive thread
    pub fn with_workers(mut self, workers: IngestWorkerPool) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Shared pipeline, for querying state while the loop runs
    pub fn pipeline(&self) -> &Arc<IngestPipeline> {
        &self.pipeline
    }

    /// Flag that keeps the loop alive; store `false` to stop it
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Receive until stopped. Individual datagrams never end the loop.
    pub fn run(self) -> Result<()> {
        let Self {
            socket,
            pipeline,
            workers,
            running,
            max_datagram,
            recv_timeout,
        } = self;

        // One spare byte tells a datagram that exactly fits apart from one
        // the kernel truncated.
        let mut buf = vec![0u8; max_datagram + 1];
        tracing::info!("Telemetry listener running");

        while running.load(Ordering::SeqCst) {
            let (n, from) = match socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) => match classify_recv_error(e.kind()) {
                    RecvFailure::Idle => continue,
                    RecvFailure::Backoff => {
                        tracing::warn!("Receive failed: {}", e);
                        std::thread::sleep(recv_timeout);
                        continue;
                    }
                },
            };

            if n > max_datagram {
                pipeline.stats().record_oversized();
                tracing::warn!(
                    "Dropping datagram from {}: larger than {} bytes",
                    from,
                    max_datagram
                );
                continue;
            }

            let sample = match pipeline.decode(&buf[..n]) {
                Ok(sample) => sample,
                Err(e) => {
                    tracing::warn!("Dropping datagram from {}: {}", from, e);
                    continue;
                }
            };

            match &workers {
                Some(pool) => {
                    if let Err(e) = pool.dispatch(sample) {
                        tracing::error!("Dropping sample from {}: {}", from, e);
                    }
                }
                None => {
                    pipeline.accept(sample);
                }
            }
        }

        if let Some(pool) = workers {
            pool.shutdown();
        }
        tracing::info!("Telemetry listener stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{TelemetryCodec, DEMO_KEY};
    use crate::config::ScoringConfig;
    use crate::store::NodeStateStore;

    fn pipeline() -> Arc<IngestPipeline> {
        Arc::new(
            IngestPipeline::new(
                TelemetryCodec::new(DEMO_KEY).unwrap(),
                Arc::new(NodeStateStore::default()),
                None,
                &ScoringConfig::default(),
            )
            .unwrap(),
        )
    }

    fn loopback() -> NetworkConfig {
        NetworkConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            recv_timeout_ms: 20,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn test_socket_errors_back_off_but_timeouts_do_not() {
        assert_eq!(classify_recv_error(ErrorKind::WouldBlock), RecvFailure::Idle);
        assert_eq!(classify_recv_error(ErrorKind::TimedOut), RecvFailure::Idle);
        assert_eq!(
            classify_recv_error(ErrorKind::ConnectionRefused),
            RecvFailure::Backoff
        );
        assert_eq!(classify_recv_error(ErrorKind::Other), RecvFailure::Backoff);
    }

    #[test]
    fn test_bind_conflict_is_bind_error() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let network = NetworkConfig {
            listen_addr: taken.local_addr().unwrap(),
            ..loopback()
        };
        let err = TelemetryListener::bind(pipeline(), &network).unwrap_err();
        assert!(matches!(err, GatewayError::Bind { .. }));
    }

    #[test]
    fn test_stop_handle_ends_idle_loop() {
        let listener = TelemetryListener::bind(pipeline(), &loopback()).unwrap();
        let stop = listener.stop_handle();
        let handle = std::thread::spawn(move || listener.run());
        std::thread::sleep(Duration::from_millis(50));
        stop.store(false, Ordering::SeqCst);
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_oversized_datagram_is_dropped() {
        let network = NetworkConfig {
            max_datagram: 32,
            ..loopback()
        };
        let listener = TelemetryListener::bind(pipeline(), &network).unwrap();
        let addr = listener.local_addr().unwrap();
        let pipeline = listener.pipeline().clone();
        let stop = listener.stop_handle();
        let handle = std::thread::spawn(move || listener.run());

        let codec = TelemetryCodec::new(DEMO_KEY).unwrap();
        let big = codec.encrypt(br#"{"node_id":"n1","temp":1,"vib":2,"sound":3}"#);
        assert!(big.len() > 32);
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.send_to(&big, addr).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while pipeline.stats().snapshot().oversized == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        stop.store(false, Ordering::SeqCst);
        handle.join().unwrap().unwrap();

        assert_eq!(pipeline.stats().snapshot().oversized, 1);
        assert!(pipeline.store().is_empty());
    }
}
