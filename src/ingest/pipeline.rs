//! Per-datagram ingestion: decode, score, store, persist

use std::sync::Arc;

use crate::codec::TelemetryCodec;
use crate::config::{GatewayConfig, ScoringConfig};
use crate::error::{GatewayError, PersistenceError, Result};
use crate::ingest::IngestStats;
use crate::parser;
use crate::persistence::{ReadingSink, SqliteReadingLog, UnavailableSink};
use crate::scorer::ScorerRegistry;
use crate::store::NodeStateStore;
use crate::types::Sample;

/// Result of the durable write for one accepted sample
#[derive(Debug)]
pub enum PersistOutcome {
    /// Written with this id
    Stored(i64),
    /// No reading log configured
    Disabled,
    /// The write failed; the sample is still in the store
    Failed(PersistenceError),
}

impl PersistOutcome {
    /// Whether the reading reached durable storage
    pub fn is_stored(&self) -> bool {
        matches!(self, PersistOutcome::Stored(_))
    }
}

/// A sample that made it into the store
#[derive(Debug)]
pub struct Accepted {
    /// The stored sample, carrying its anomaly score if either side computed one
    pub sample: Sample,
    /// Whether the score was computed here rather than by the producer
    pub scored_here: bool,
    /// Durable write result
    pub persisted: PersistOutcome,
}

/// Shared ingestion logic
///
/// One pipeline is shared (`Arc`) by the receive thread and every worker.
/// Its parts are individually thread-safe: the codec is immutable, scorers
/// are locked per node, the store locks per node and the sink serializes
/// its own writes.
pub struct IngestPipeline {
    codec: TelemetryCodec,
    scorers: ScorerRegistry,
    store: Arc<NodeStateStore>,
    sink: Option<Arc<dyn ReadingSink>>,
    score_missing: bool,
    stats: Arc<IngestStats>,
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("codec", &self.codec)
            .field("nodes", &self.store.len())
            .field("persisting", &self.sink.is_some())
            .field("score_missing", &self.score_missing)
            .finish()
    }
}

impl IngestPipeline {
    /// Assemble a pipeline from its parts
    pub fn new(
        codec: TelemetryCodec,
        store: Arc<NodeStateStore>,
        sink: Option<Arc<dyn ReadingSink>>,
        scoring: &ScoringConfig,
    ) -> Result<Self> {
        Ok(Self {
            codec,
            scorers: ScorerRegistry::new(scoring.alpha)?,
            store,
            sink,
            score_missing: scoring.score_missing,
            stats: Arc::new(IngestStats::new()),
        })
    }

    /// Build the codec, store and (if enabled) the on-disk reading log
    /// described by `config`. A log that cannot be opened is reported and
    /// replaced by [`UnavailableSink`], so every accepted sample records
    /// [`PersistOutcome::Failed`] while the store keeps updating.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        config.validate()?;
        let codec = TelemetryCodec::new(config.crypto.key_bytes())?;
        let store = Arc::new(NodeStateStore::new(config.store.history_capacity));
        let sink: Option<Arc<dyn ReadingSink>> = if config.persistence.enabled {
            let path = config.persistence.resolved_path();
            match SqliteReadingLog::open(&path) {
                Ok(log) => Some(Arc::new(log)),
                Err(e) => {
                    // Durable writes are best effort; only binding may stop the gateway
                    tracing::error!(
                        "Reading log {:?} could not be opened, readings will not be persisted: {}",
                        path,
                        e
                    );
                    Some(Arc::new(UnavailableSink::new(format!("{:?}: {}", path, e))))
                }
            }
        } else {
            tracing::info!("Persistence disabled; readings are kept in memory only");
            None
        };
        Self::new(codec, store, sink, &config.scoring)
    }

    /// Query handle for consumers of node state
    pub fn store(&self) -> &Arc<NodeStateStore> {
        &self.store
    }

    /// Ingestion counters
    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// Gateway-side scorers
    pub fn scorers(&self) -> &ScorerRegistry {
        &self.scorers
    }

    /// Decrypt and parse one datagram. Errors only concern this datagram.
    pub fn decode(&self, datagram: &[u8]) -> Result<Sample> {
        self.stats.record_received();
        let plaintext = self.codec.decrypt(datagram).map_err(|e| {
            self.stats.record_codec_error();
            GatewayError::Codec(e)
        })?;
        parser::parse(&plaintext).map_err(|e| {
            self.stats.record_parse_error();
            GatewayError::Parse(e)
        })
    }

    /// Score (if the producer did not), store and persist a decoded sample
    pub fn accept(&self, sample: Sample) -> Accepted {
        let (sample, scored_here) = if self.score_missing && !sample.is_scored() {
            let score = self.scorers.score(&sample);
            self.stats.record_scored();
            (sample.with_anomaly_score(score), true)
        } else {
            (sample, false)
        };

        // The store is updated first and unconditionally: a failed durable
        // write must not hide the reading from query consumers.
        self.store.update(sample.clone());
        self.stats.record_accepted();

        let persisted = match &self.sink {
            None => PersistOutcome::Disabled,
            Some(sink) => match sink.append(&sample) {
                Ok(id) => PersistOutcome::Stored(id),
                Err(e) => {
                    self.stats.record_persistence_failure();
                    tracing::warn!(
                        "Reading from {} kept in memory but not persisted: {}",
                        sample.node_id(),
                        e
                    );
                    PersistOutcome::Failed(e)
                }
            },
        };

        tracing::debug!(
            node = sample.node_id(),
            score = ?sample.anomaly_score(),
            scored_here,
            "accepted sample"
        );

        Accepted {
            sample,
            scored_here,
            persisted,
        }
    }

    /// Full processing of one datagram on the calling thread
    pub fn process_datagram(&self, datagram: &[u8]) -> Result<Accepted> {
        let sample = self.decode(datagram)?;
        Ok(self.accept(sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DEMO_KEY;
    use crate::persistence::MockReadingSink;
    use crate::types::SensorReadings;

    fn datagram(json: &str) -> Vec<u8> {
        TelemetryCodec::new(DEMO_KEY).unwrap().encrypt(json.as_bytes())
    }

    fn pipeline_with(sink: Option<Arc<dyn ReadingSink>>) -> IngestPipeline {
        IngestPipeline::new(
            TelemetryCodec::new(DEMO_KEY).unwrap(),
            Arc::new(NodeStateStore::default()),
            sink,
            &ScoringConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_producer_score_passes_through() {
        let mut sink = MockReadingSink::new();
        sink.expect_append().times(1).returning(|_| Ok(1));
        let pipeline = pipeline_with(Some(Arc::new(sink)));

        let accepted = pipeline
            .process_datagram(&datagram(
                r#"{"node_id":"n1","temp":40,"vib":0.02,"sound":50,"anomaly_score":3.5}"#,
            ))
            .unwrap();
        assert!(!accepted.scored_here);
        assert_eq!(accepted.sample.anomaly_score(), Some(3.5));
        assert!(accepted.persisted.is_stored());
        assert!(pipeline.scorers().is_empty());
    }

    #[test]
    fn test_unscored_sample_is_scored_here() {
        let pipeline = pipeline_with(None);
        let accepted = pipeline
            .process_datagram(&datagram(r#"{"node_id":"n1","temp":40,"vib":0.02,"sound":50}"#))
            .unwrap();
        assert!(accepted.scored_here);
        assert_eq!(accepted.sample.anomaly_score(), Some(0.0));
        assert!(matches!(accepted.persisted, PersistOutcome::Disabled));
        assert_eq!(
            pipeline.store().get_latest("n1").unwrap().anomaly_score(),
            Some(0.0)
        );
        assert_eq!(pipeline.stats().snapshot().scored_at_gateway, 1);
    }

    #[test]
    fn test_score_missing_disabled_leaves_sample_unscored() {
        let pipeline = IngestPipeline::new(
            TelemetryCodec::new(DEMO_KEY).unwrap(),
            Arc::new(NodeStateStore::default()),
            None,
            &ScoringConfig {
                score_missing: false,
                ..ScoringConfig::default()
            },
        )
        .unwrap();
        let accepted = pipeline.accept(Sample::new(
            "n1",
            None,
            SensorReadings::new(1.0, 2.0, 3.0),
            None,
        ));
        assert!(!accepted.scored_here);
        assert!(!accepted.sample.is_scored());
    }

    #[test]
    fn test_persistence_failure_still_updates_store() {
        let mut sink = MockReadingSink::new();
        sink.expect_append().times(1).returning(|_| {
            Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        });
        let pipeline = pipeline_with(Some(Arc::new(sink)));

        let accepted = pipeline
            .process_datagram(&datagram(
                r#"{"node_id":"n1","temp":40,"vib":0.02,"sound":50,"anomaly_score":0.1}"#,
            ))
            .unwrap();
        assert!(matches!(accepted.persisted, PersistOutcome::Failed(_)));
        assert!(pipeline.store().get_latest("n1").is_some());

        let stats = pipeline.stats().snapshot();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.persistence_failures, 1);
    }

    #[test]
    fn test_bad_datagrams_are_classified() {
        let mut sink = MockReadingSink::new();
        sink.expect_append().never();
        let pipeline = pipeline_with(Some(Arc::new(sink)));

        let err = pipeline.process_datagram(&[0u8; 15]).unwrap_err();
        assert!(matches!(err, GatewayError::Codec(_)));

        let err = pipeline
            .process_datagram(&datagram(r#"{"node_id":"n1","temp":40}"#))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Parse(_)));
        assert!(err.is_packet_local());

        let stats = pipeline.stats().snapshot();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.codec_errors, 1);
        assert_eq!(stats.parse_errors, 1);
        assert_eq!(stats.accepted, 0);
        assert!(pipeline.store().is_empty());
    }

    #[test]
    fn test_from_config_survives_unopenable_log() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let mut config = GatewayConfig::default();
        config.persistence.database_path = Some(blocker.path().join("gw.db"));
        let pipeline = IngestPipeline::from_config(&config).unwrap();

        let accepted = pipeline
            .process_datagram(&datagram(r#"{"node_id":"n1","temp":40,"vib":0.02,"sound":50}"#))
            .unwrap();
        assert!(matches!(
            accepted.persisted,
            PersistOutcome::Failed(PersistenceError::Unavailable(_))
        ));
        assert!(pipeline.store().get_latest("n1").is_some());
        assert_eq!(pipeline.stats().snapshot().persistence_failures, 1);
    }

    #[test]
    fn test_from_config_with_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.persistence.database_path = Some(dir.path().join("gw.db"));
        let pipeline = IngestPipeline::from_config(&config).unwrap();

        let accepted = pipeline
            .process_datagram(&datagram(r#"{"node_id":"n1","temp":40,"vib":0.02,"sound":50}"#))
            .unwrap();
        assert!(matches!(accepted.persisted, PersistOutcome::Stored(_)));

        let log = SqliteReadingLog::open(dir.path().join("gw.db")).unwrap();
        assert_eq!(log.count().unwrap(), 1);
    }
}
