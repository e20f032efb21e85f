//! Fixed-cadence sampling of the latest delivered value.
//!
//! The pipeline only delivers when the sensor value changes. A data log wants
//! one row per tick regardless, so [`Sampler`] reads the most recent value on
//! its own interval and records it with the time elapsed since logging began.

use crate::error::{Result, StreamError};
use crate::reading::ConvertedValue;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// One row of the data log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Seconds since logging started
    pub time: f64,
    /// Sampled value, in the unit it was delivered in
    pub temperature: f64,
}

/// Samples a `watch` of the latest value every `every` while logging.
///
/// Stopping keeps the recorded entries and the start time, so a restart
/// continues the same timeline. [`reset`](Self::reset) clears both.
pub struct Sampler {
    every: Duration,
    entries: Arc<Mutex<Vec<LogEntry>>>,
    started_at: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

impl Sampler {
    pub fn new(every: Duration) -> Result<Self> {
        if every.is_zero() {
            return Err(StreamError::config_error("Sampling interval must be non-zero"));
        }
        Ok(Self {
            every,
            entries: Arc::new(Mutex::new(Vec::new())),
            started_at: None,
            task: None,
        })
    }

    pub fn interval(&self) -> Duration {
        self.every
    }

    /// Begin sampling `latest`. Ticks with no value yet are skipped.
    pub fn start(&mut self, latest: watch::Receiver<Option<ConvertedValue>>) {
        if self.is_logging() {
            return;
        }

        let started_at = *self.started_at.get_or_insert_with(Instant::now);
        let entries = Arc::clone(&self.entries);
        let every = self.every;

        info!("Logging every {}ms", every.as_millis());
        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            // After a stall, resume on the cadence instead of catching up
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let current = *latest.borrow();
                let Some(value) = current else {
                    continue;
                };
                let entry = LogEntry {
                    time: started_at.elapsed().as_secs_f64(),
                    temperature: value.value,
                };
                debug!("Logged {:.2} at {:.3}s", entry.temperature, entry.time);
                entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(entry);
            }
        }));
    }

    /// Stop sampling, keeping what was recorded.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Logging stopped");
        }
    }

    pub fn is_logging(&self) -> bool {
        self.task.is_some()
    }

    /// Recorded entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop sampling and forget the log and its start time.
    pub fn reset(&mut self) {
        self.stop();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.started_at = None;
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop();
    }
}
