//! Edge node: scores readings locally and sends them to a gateway
//!
//! The node keeps its own [`AnomalyScorer`], so every datagram it sends
//! already carries an `anomaly_score` and the gateway stores it as-is.

use std::net::{SocketAddr, UdpSocket};

use crate::codec::TelemetryCodec;
use crate::error::Result;
use crate::parser;
use crate::scorer::AnomalyScorer;
use crate::types::{Sample, SensorReadings};

/// Sending side of one telemetry node
#[derive(Debug)]
pub struct EdgeNode {
    node_id: String,
    codec: TelemetryCodec,
    scorer: AnomalyScorer,
    socket: UdpSocket,
    target: SocketAddr,
}

impl EdgeNode {
    /// Create a node that sends to `target` from an ephemeral local port
    pub fn new(
        node_id: impl Into<String>,
        key: &[u8],
        alpha: f64,
        target: SocketAddr,
    ) -> Result<Self> {
        let codec = TelemetryCodec::new(key)?;
        let scorer = AnomalyScorer::new(alpha)?;
        let local: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local)?;
        Ok(Self {
            node_id: node_id.into(),
            codec,
            scorer,
            socket,
            target,
        })
    }

    /// Node identifier
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Gateway address
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Local scorer state
    pub fn scorer(&self) -> &AnomalyScorer {
        &self.scorer
    }

    /// Stamp, score and encrypt readings without sending them
    pub fn prepare(&mut self, readings: SensorReadings) -> Result<(Sample, Vec<u8>)> {
        let timestamp = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let score = self.scorer.update_and_score(&readings);
        let sample = Sample::new(self.node_id.clone(), Some(timestamp), readings, Some(score));
        let datagram = self.codec.encrypt(&parser::encode(&sample)?);
        Ok((sample, datagram))
    }

    /// Send one reading as one datagram and return the sample that was sent
    pub fn send(&mut self, readings: SensorReadings) -> Result<Sample> {
        let (sample, datagram) = self.prepare(readings)?;
        self.socket.send_to(&datagram, self.target)?;
        tracing::trace!(
            node = %self.node_id,
            score = ?sample.anomaly_score(),
            "sent sample to {}",
            self.target
        );
        Ok(sample)
    }
}
