//! Test data builders for creating samples and datagrams

use telemetry_gateway::codec::{TelemetryCodec, DEMO_KEY};
use telemetry_gateway::{parser, Sample, SensorReadings};

/// Builder for creating test Samples
pub struct SampleBuilder {
    node_id: String,
    timestamp: Option<f64>,
    readings: SensorReadings,
    anomaly_score: Option<f64>,
}

impl SampleBuilder {
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            timestamp: None,
            readings: SensorReadings::new(40.0, 0.02, 50.0),
            anomaly_score: None,
        }
    }

    pub fn timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn readings(mut self, temp: f64, vib: f64, sound: f64) -> Self {
        self.readings = SensorReadings::new(temp, vib, sound);
        self
    }

    pub fn score(mut self, score: f64) -> Self {
        self.anomaly_score = Some(score);
        self
    }

    pub fn build(self) -> Sample {
        Sample::new(
            self.node_id,
            self.timestamp,
            self.readings,
            self.anomaly_score,
        )
    }

    /// Encode and encrypt with the demo key
    pub fn datagram(self) -> Vec<u8> {
        encrypt_sample(&self.build())
    }
}

/// Encode and encrypt a sample with the demo key
pub fn encrypt_sample(sample: &Sample) -> Vec<u8> {
    let payload = parser::encode(sample).unwrap();
    TelemetryCodec::new(DEMO_KEY).unwrap().encrypt(&payload)
}

/// Encrypt a raw payload with the demo key
pub fn encrypt_raw(payload: &[u8]) -> Vec<u8> {
    TelemetryCodec::new(DEMO_KEY).unwrap().encrypt(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_builder() {
        let sample = SampleBuilder::new("n1")
            .timestamp(1.0)
            .readings(1.0, 2.0, 3.0)
            .score(0.5)
            .build();

        assert_eq!(sample.node_id(), "n1");
        assert_eq!(sample.timestamp(), Some(1.0));
        assert_eq!(sample.readings().vib, 2.0);
        assert_eq!(sample.anomaly_score(), Some(0.5));
    }
}
