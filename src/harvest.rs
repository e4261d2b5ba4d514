//! Pagination controller driving the fetch, back-off, and persist loop.
//!
//! The loop walks the source one page at a time, following continuation
//! tokens. A rate-limit response suspends the run until the reported reset and
//! then retries the very same request; every page after the first is preceded
//! by a randomized politeness delay. Records are numbered in harvest order and
//! handed to the sink one by one; a failed write is logged and skipped.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::controls::HarvestControls;
use crate::pacing::{DelayPolicy, Pacer};
use crate::record::{Cursor, Page, Record, SequencedRecord};
use crate::sink::RecordSink;
use crate::source::{SourceClient, SourceError};

/// Fatal harvest failures. Rate limits and write failures never surface here.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The source failed with something other than a rate limit.
    #[error("fetching page failed after {records_written} records: {source}")]
    Source {
        /// Records processed before the failure.
        records_written: u64,
        /// The unclassified source error.
        #[source]
        source: SourceError,
    },
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// The record target was met.
    TargetReached,
    /// The source ran out of records first.
    Exhausted,
}

impl fmt::Display for HarvestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarvestOutcome::TargetReached => f.write_str("target reached"),
            HarvestOutcome::Exhausted => f.write_str("exhausted"),
        }
    }
}

/// Process-local progress of a single run.
#[derive(Debug, Default)]
struct RunState {
    records_written: u64,
    cursor: Option<Cursor>,
    pages_fetched: u64,
    rate_limit_waits: u64,
    write_failures: u64,
}

impl RunState {
    fn next_sequence(&mut self) -> u64 {
        self.records_written += 1;
        self.records_written
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestSummary {
    target: u64,
    final_count: u64,
    outcome: HarvestOutcome,
    pages_fetched: u64,
    rate_limit_waits: u64,
    write_failures: u64,
}

impl HarvestSummary {
    fn from_state(target: u64, state: &RunState, outcome: HarvestOutcome) -> Self {
        Self {
            target,
            final_count: state.records_written,
            outcome,
            pages_fetched: state.pages_fetched,
            rate_limit_waits: state.rate_limit_waits,
            write_failures: state.write_failures,
        }
    }

    /// Records processed during the run.
    pub fn final_count(&self) -> u64 {
        self.final_count
    }

    /// Requested record count.
    pub fn target(&self) -> u64 {
        self.target
    }

    /// Terminal state of the run.
    pub fn outcome(&self) -> HarvestOutcome {
        self.outcome
    }

    /// Whether the processed count met the target.
    pub fn reached_target(&self) -> bool {
        self.final_count >= self.target
    }

    /// Non-empty pages received.
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Number of rate-limit suspensions.
    pub fn rate_limit_waits(&self) -> u64 {
        self.rate_limit_waits
    }

    /// Records whose write failed.
    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    /// Records that actually reached the sink.
    pub fn records_persisted(&self) -> u64 {
        self.final_count - self.write_failures
    }

    /// Logs the end-of-run report.
    pub fn report(&self) {
        if !self.reached_target() {
            warn!(
                final_count = self.final_count,
                target_count = self.target,
                "fetched {} records, but could not reach the target of {}",
                self.final_count,
                self.target
            );
        }
        info!(
            outcome = %self.outcome,
            pages = self.pages_fetched,
            rate_limit_waits = self.rate_limit_waits,
            write_failures = self.write_failures,
            "done! got {} records",
            self.final_count
        );
    }
}

/// Drives one harvest run against a source and a sink.
pub struct Harvester<P> {
    target: u64,
    delay: DelayPolicy,
    pacer: P,
    rng: StdRng,
}

impl<P: Pacer> Harvester<P> {
    /// Creates a controller that stops after `target` records.
    pub fn new(target: u64, delay: DelayPolicy, pacer: P) -> Self {
        Self {
            target,
            delay,
            pacer,
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a controller from run controls.
    pub fn from_controls(controls: &HarvestControls, pacer: P) -> Self {
        Self::new(controls.target(), controls.delay(), pacer)
    }

    /// Seeds the politeness-delay generator for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// The pacer used for all suspensions.
    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Runs until the target is met or the source is exhausted.
    pub async fn run<C, S>(
        &mut self,
        source: &mut C,
        sink: &S,
    ) -> Result<HarvestSummary, HarvestError>
    where
        C: SourceClient + ?Sized,
        S: RecordSink + ?Sized,
    {
        let mut state = RunState::default();
        info!(target_count = self.target, "starting harvest");

        let outcome = loop {
            if state.records_written >= self.target {
                break HarvestOutcome::TargetReached;
            }

            let page = self.fetch_next(source, &mut state).await?;
            if page.is_empty() {
                info!("no more records found");
                break HarvestOutcome::Exhausted;
            }

            state.pages_fetched += 1;
            let (records, next_cursor) = page.into_parts();
            self.persist(records, sink, &mut state);
            info!(page = state.pages_fetched, "got {} records", state.records_written);

            match next_cursor {
                Some(cursor) => state.cursor = Some(cursor),
                None if state.records_written >= self.target => {
                    break HarvestOutcome::TargetReached;
                }
                None => {
                    info!("source offered no further pages");
                    break HarvestOutcome::Exhausted;
                }
            }
        };

        Ok(HarvestSummary::from_state(self.target, &state, outcome))
    }

    async fn fetch_next<C>(
        &mut self,
        source: &mut C,
        state: &mut RunState,
    ) -> Result<Page, HarvestError>
    where
        C: SourceClient + ?Sized,
    {
        loop {
            if state.pages_fetched == 0 {
                info!("getting records...");
            } else {
                let delay = self.delay.sample(&mut self.rng);
                info!(
                    wait_secs = delay.as_secs_f64(),
                    "getting next records after {:.1} seconds...",
                    delay.as_secs_f64()
                );
                self.pacer.sleep(delay).await;
            }

            match source.fetch_page(state.cursor.as_ref()).await {
                Ok(page) => return Ok(page),
                Err(SourceError::RateLimited(signal)) => {
                    let wait = signal.wait_from(self.pacer.now());
                    state.rate_limit_waits += 1;
                    warn!(
                        reset_at = %signal.reset_at,
                        wait_secs = wait.as_secs_f64(),
                        "rate limit reached, waiting until reset"
                    );
                    self.pacer.sleep(wait).await;
                }
                Err(err) => {
                    return Err(HarvestError::Source {
                        records_written: state.records_written,
                        source: err,
                    })
                }
            }
        }
    }

    fn persist<S>(&self, records: Vec<Record>, sink: &S, state: &mut RunState)
    where
        S: RecordSink + ?Sized,
    {
        for record in records {
            // Numbers are consumed even when the write below fails.
            let entry = SequencedRecord::new(state.next_sequence(), record);
            match sink.append(&entry) {
                Ok(()) => debug!(sequence = entry.sequence, "record written"),
                Err(err) => {
                    state.write_failures += 1;
                    warn!(sequence = entry.sequence, error = %err, "error writing record");
                }
            }
        }
    }
}
