//! Ingestion cycle: fetch → raw snapshot → parse → append
//!
//! Cycles are single-flight. Starting a cycle while another is still running
//! is refused with [`CycleError::Busy`] instead of queued, so two cycles can
//! never interleave writes to the event log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use persistence::{CycleReport, EventLog};
use tracing::{debug, info};
use tracking::feed::{parse_feed, FeedDiagnostics};
use types::ids::CycleId;

use crate::error::CycleError;
use crate::fetch::FeedSource;

/// Clears the in-flight flag when a cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Ingestor<F> {
    feed: F,
    log: EventLog,
    in_flight: AtomicBool,
}

impl<F: FeedSource> Ingestor<F> {
    pub fn new(feed: F, log: EventLog) -> Self {
        Self {
            feed,
            log,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one cycle. A fetch failure returns before anything is written.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let _in_flight = InFlight::acquire(&self.in_flight).ok_or(CycleError::Busy)?;

        let cycle_id = CycleId::new();
        let started = Instant::now();
        let fetched_at = Utc::now();
        info!(cycle = %cycle_id, url = %self.feed.url(), "Cycle started");

        let body = self.feed.fetch().await?;

        let diagnostics = FeedDiagnostics::inspect(&body);
        info!(
            cycle = %cycle_id,
            bytes = diagnostics.bytes,
            record_tags = diagnostics.record_tags,
            "Feed fetched"
        );

        let points = parse_feed(&body);
        info!(cycle = %cycle_id, parsed = points.len(), "Parsed points");
        for point in points.iter().take(3) {
            debug!(
                cycle = %cycle_id,
                entity = %point.entity_id,
                lat = point.position.lat,
                lon = point.position.lon,
                "Sample point"
            );
        }

        let report = self.log.record_cycle(cycle_id, fetched_at, &body, &points)?;
        info!(
            cycle = %cycle_id,
            appended = report.appended,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cycle finished"
        );
        Ok(report)
    }
}
