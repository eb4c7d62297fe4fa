//! Metric Router
//!
//! Validates `perf` elements, resolves them against the schema cache and
//! queues store requests for the storage worker.

mod event;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub use event::{MetricEvent, PERF_ELEMENT, REQUIRED_FIELDS, Rejection};

use crate::ingress::{Element, Frame};
use crate::schema::SchemaReader;
use crate::storage::{StorageError, StorageWriter, StoreRequest, storage_path};

/// What the router did with one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued for the storage worker.
    Forwarded,
    /// Not a metric, or missing fields.
    Invalid,
    /// No schema for the `(host, datasource)` pair.
    Unknown,
}

/// Snapshot of the router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub forwarded: u64,
    pub invalid: u64,
    pub unknown: u64,
}

#[derive(Debug, Default)]
struct Counters {
    forwarded: AtomicU64,
    invalid: AtomicU64,
    unknown: AtomicU64,
}

/// Routes metric elements to storage.
pub struct MetricRouter {
    schemas: SchemaReader,
    writer: StorageWriter,
    base_dir: PathBuf,
    counters: Counters,
}

impl MetricRouter {
    pub fn new(schemas: SchemaReader, writer: StorageWriter, base_dir: impl AsRef<Path>) -> Self {
        Self {
            schemas,
            writer,
            base_dir: base_dir.as_ref().to_path_buf(),
            counters: Counters::default(),
        }
    }

    /// Forward every payload element of a frame.
    ///
    /// Only fails when the storage worker is gone.
    pub fn dispatch(&self, frame: &Frame) -> Result<(), StorageError> {
        for element in frame.elements() {
            self.forward(element)?;
        }
        Ok(())
    }

    /// Validate, resolve and queue one element.
    pub fn forward(&self, element: &Element) -> Result<RouteOutcome, StorageError> {
        let event = match MetricEvent::from_element(element) {
            Ok(event) => event,
            Err(rejection) => {
                self.reject(&rejection);
                return Ok(self.count(RouteOutcome::Invalid));
            }
        };

        let Some(schema) = self.schemas.lookup(&event.host, &event.datasource) else {
            tracing::warn!(
                host = %event.host,
                datasource = %event.datasource,
                "No storage configuration for this metric, dropping it"
            );
            return Ok(self.count(RouteOutcome::Unknown));
        };

        let path = storage_path(&self.base_dir, &event.host, &event.datasource);
        tracing::trace!(path = %path.display(), timestamp = event.timestamp, value = %event.value, "Forwarding metric");

        self.writer.store(StoreRequest {
            path,
            timestamp: event.timestamp,
            value: event.value,
            schema,
        })?;
        Ok(self.count(RouteOutcome::Forwarded))
    }

    fn reject(&self, rejection: &Rejection) {
        match rejection {
            Rejection::WrongType(name) => {
                tracing::warn!(element = %name, "Not a valid message type, dropping it");
            }
            Rejection::MissingFields(fields) => {
                for field in fields {
                    tracing::warn!(%field, "Metric is missing a field, dropping it");
                }
            }
            Rejection::BadTimestamp(raw) => {
                tracing::warn!(timestamp = %raw, "Metric timestamp is not an integer, dropping it");
            }
        }
    }

    fn count(&self, outcome: RouteOutcome) -> RouteOutcome {
        let counter = match outcome {
            RouteOutcome::Forwarded => &self.counters.forwarded,
            RouteOutcome::Invalid => &self.counters.invalid,
            RouteOutcome::Unknown => &self.counters.unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            invalid: self.counters.invalid.load(Ordering::Relaxed),
            unknown: self.counters.unknown.load(Ordering::Relaxed),
        }
    }

    /// Log the counters.
    pub fn log_summary(&self) {
        let stats = self.stats();
        tracing::info!(
            forwarded = stats.forwarded,
            invalid = stats.invalid,
            unknown = stats.unknown,
            "Router summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::ItemEntry;
    use crate::schema::{
        ArchiveSpec, Bound, ConsolidationFn, DatasourceSchema, DsType, Marker, SchemaCache,
        SchemaError, SchemaKey, SchemaMap, SchemaProvider, StorageSchema,
    };
    use crate::storage::Command;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::mpsc::{self, Receiver};

    struct Fixed;

    #[async_trait]
    impl SchemaProvider for Fixed {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        async fn marker(&self) -> Result<Option<Marker>, SchemaError> {
            Ok(Some(Utc::now()))
        }

        async fn load(&self) -> Result<SchemaMap, SchemaError> {
            let schema = StorageSchema {
                datasource: DatasourceSchema {
                    id: 1,
                    name: "Load_5".to_string(),
                    ds_type: DsType::Gauge,
                    step: 300,
                    heartbeat: 600,
                    min: Bound::Value(0.0),
                    max: Bound::Value(100.0),
                },
                archives: vec![ArchiveSpec {
                    cf: ConsolidationFn::Average,
                    xff: 0.5,
                    step: 1,
                    rows: 600,
                }],
            };
            Ok(SchemaMap::from([(
                SchemaKey::new("srv1", "Load%205"),
                Arc::new(schema),
            )]))
        }
    }

    async fn router() -> (MetricRouter, Receiver<Command>) {
        let mut cache = SchemaCache::new(Box::new(Fixed));
        cache.refresh().await;
        let (tx, rx) = mpsc::sync_channel(16);
        let router = MetricRouter::new(cache.reader(), StorageWriter::new(tx), "/var/lib/rrd");
        (router, rx)
    }

    fn perf(host: &str, datasource: &str) -> Element {
        Element::new("perf")
            .child("timestamp", "1000")
            .child("value", "42")
            .child("host", host)
            .child("datasource", datasource)
    }

    #[tokio::test]
    async fn test_forward_queues_store_request() {
        let (router, rx) = router().await;

        assert_eq!(
            router.forward(&perf("srv1", "Load 5")).unwrap(),
            RouteOutcome::Forwarded
        );

        let Ok(Command::Store(request)) = rx.try_recv() else {
            panic!("expected a store request");
        };
        assert_eq!(request.path, PathBuf::from("/var/lib/rrd/srv1/Load%205"));
        assert_eq!(request.timestamp, 1000);
        assert_eq!(request.value, "42");
        assert_eq!(request.schema.datasource.name, "Load_5");
    }

    #[tokio::test]
    async fn test_invalid_and_unknown_are_dropped() {
        let (router, rx) = router().await;

        let partial = Element::new("perf").child("host", "srv1");
        assert_eq!(router.forward(&partial).unwrap(), RouteOutcome::Invalid);
        assert_eq!(
            router.forward(&Element::new("presence")).unwrap(),
            RouteOutcome::Invalid
        );
        assert_eq!(
            router.forward(&perf("srv2", "Load 5")).unwrap(),
            RouteOutcome::Unknown
        );

        assert!(rx.try_recv().is_err());
        assert_eq!(
            router.stats(),
            RouterStats {
                forwarded: 0,
                invalid: 2,
                unknown: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_items_frame() {
        let (router, rx) = router().await;
        let frame = Frame::Items {
            items: vec![
                ItemEntry::Item {
                    payload: vec![perf("srv1", "Load 5"), perf("srv1", "Load 5")],
                },
                ItemEntry::Retract,
            ],
        };

        router.dispatch(&frame).unwrap();
        assert_eq!(rx.try_iter().count(), 2);
        assert_eq!(router.stats().forwarded, 2);
    }

    #[tokio::test]
    async fn test_dispatch_fails_without_worker() {
        let (router, rx) = router().await;
        drop(rx);

        let frame = Frame::Chat {
            body: vec![perf("srv1", "Load 5")],
        };
        assert!(matches!(
            router.dispatch(&frame),
            Err(StorageError::ChannelSend)
        ));
    }
}
