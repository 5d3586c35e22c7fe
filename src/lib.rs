//! # Telemetry Gateway: encrypted UDP telemetry with online anomaly scoring
//!
//! Sensor nodes send one AES-encrypted JSON document per UDP datagram. The
//! gateway decrypts and parses each datagram, scores it when the node did
//! not, keeps the latest sample and a bounded history per node in memory,
//! and appends every accepted reading to a SQLite log.
//!
//! ## Architecture
//!
//! - **Codec**: AES-ECB with PKCS#7 padding over the whole payload
//! - **Parser**: JSON payload to [`Sample`]
//! - **Scorer**: per-node EMA mean/variance z-score, weighted across sensors
//! - **Store**: latest sample and history per node, shared across threads
//! - **Persistence**: append-only reading log behind the [`ReadingSink`] trait
//! - **Ingest**: the receive loop, optionally fanned out to node-keyed workers
//!
//! A datagram that fails anywhere before the store is dropped on its own;
//! the loop keeps running. Only binding the socket is fatal.
//!
//! ## Data Location
//!
//! The reading log defaults to `gateway_data.db` in the platform data
//! directory under `dev.telemetry-gateway`:
//!
//! - **Linux**: `~/.local/share/dev.telemetry-gateway/`
//! - **macOS**: `~/Library/Application Support/dev.telemetry-gateway/`
//! - **Windows**: `%APPDATA%\dev.telemetry-gateway\`
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::atomic::Ordering;
//! use telemetry_gateway::{config::GatewayConfig, Gateway};
//!
//! let gateway = Gateway::from_config(&GatewayConfig::load()?)?;
//! let store = gateway.store();
//! let stop = gateway.stop_handle();
//!
//! let handle = std::thread::spawn(move || gateway.run());
//!
//! for (node, sample) in store.get_latest_all() {
//!     println!("{}: {:?}", node, sample.anomaly_score());
//! }
//!
//! stop.store(false, Ordering::SeqCst);
//! handle.join().unwrap()?;
//! ```

pub mod analysis;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod parser;
pub mod persistence;
pub mod producer;
pub mod scorer;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use codec::TelemetryCodec;
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use ingest::{IngestPipeline, IngestStats, TelemetryListener};
pub use persistence::{ReadingSink, SqliteReadingLog, UnavailableSink};
pub use producer::EdgeNode;
pub use scorer::{AnomalyScorer, ScorerRegistry};
pub use store::NodeStateStore;
pub use types::{Sample, Sensor, SensorReadings};
