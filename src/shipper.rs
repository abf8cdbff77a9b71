use crate::config::Config;
use crate::cursor::CursorStore;
use crate::sink::EventSink;
use crate::source::{AuditLogExtractor, DatabaseExtractor};
use crate::stream::build_push_request;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// What one cycle did. Delivery failures are counted, not propagated: a
/// failed batch never stops the remaining batches or future cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Events extracted this cycle, regardless of delivery outcome.
    pub extracted: usize,
    pub batches_sent: usize,
    pub batches_failed: usize,
}

/// Owns the cursors, both extractors and the sink, and drives the
/// extract → format → push cycle.
pub struct Shipper {
    config: Config,
    cursors: CursorStore,
    database: DatabaseExtractor,
    audit_log: AuditLogExtractor,
    sink: Arc<dyn EventSink>,
}

impl Shipper {
    pub fn new(config: Config, sink: Arc<dyn EventSink>) -> Self {
        let database = DatabaseExtractor::new(config.database.clone());
        let audit_log = AuditLogExtractor::new(config.audit_log.clone());
        Self {
            config,
            cursors: CursorStore::new(),
            database,
            audit_log,
            sink,
        }
    }

    /// Replace the default cursors, e.g. to backfill from a fixed watermark.
    pub fn with_cursors(mut self, cursors: CursorStore) -> Self {
        self.cursors = cursors;
        self
    }

    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    /// One extraction and push cycle.
    ///
    /// Database results come first, then audit log results; each source is
    /// ascending in time but the concatenation is not globally sorted. The
    /// combined list is pushed in `batch_size` chunks, each formatted and
    /// delivered independently.
    pub async fn run_once(&mut self) -> CycleReport {
        let mut events = self.database.extract(&mut self.cursors);
        events.extend(self.audit_log.extract(&mut self.cursors));

        info!(count = events.len(), "extracted events");

        let mut report = CycleReport {
            extracted: events.len(),
            ..Default::default()
        };

        for (batch_num, chunk) in events.chunks(self.config.batch_size).enumerate() {
            let request = build_push_request(chunk, &self.config.labels);
            match self.sink.send(&request).await {
                Ok(()) => report.batches_sent += 1,
                Err(e) => {
                    warn!(
                        batch = batch_num + 1,
                        events = chunk.len(),
                        error = %e,
                        "failed to deliver batch"
                    );
                    report.batches_failed += 1;
                }
            }
        }

        report
    }

    /// Cycle forever, sleeping `interval` between runs. Returns only on
    /// Ctrl-C, observed between cycles.
    pub async fn run_forever(&mut self) {
        info!(
            database = %self.config.database.display(),
            audit_log = ?self.config.audit_log,
            loki_url = %self.config.loki_url,
            interval_secs = self.config.interval.as_secs(),
            "starting shipper"
        );

        loop {
            let report = self.run_once().await;
            info!(
                extracted = report.extracted,
                sent = report.batches_sent,
                failed = report.batches_failed,
                "cycle complete"
            );

            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }
}
