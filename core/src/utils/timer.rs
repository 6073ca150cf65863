//! Phase timing
//!
//! Measures how long each phase of a judging call takes and logs the total at
//! a level that depends on how slow it was.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::{Duration, Instant};
use log::{debug, info, warn};

/// Timer with named checkpoints
#[derive(Debug, Clone)]
pub struct Timer {
    /// Name used as log prefix
    name: String,

    /// Start of the whole measurement
    start: Instant,

    /// Start of the current lap
    lap_start: Instant,

    /// Completed laps
    laps: Vec<(String, Duration)>,

    /// Totals above this are logged at warn level
    slow_threshold: Option<Duration>,
}

impl Timer {
    /// Start a timer
    pub fn new(name: impl Into<String>) -> Self {
        let now = Instant::now();
        Timer {
            name: name.into(),
            start: now,
            lap_start: now,
            laps: Vec::new(),
            slow_threshold: None,
        }
    }

    /// Log totals above `threshold` as slow
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// Time since the timer started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time since the timer started, in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Close the current lap under `name` and start a new one
    pub fn checkpoint(&mut self, name: impl Into<String>) -> Duration {
        let lap = self.lap_start.elapsed();
        let name = name.into();
        debug!("{} {}: {:?}", self.name, name, lap);
        self.laps.push((name, lap));
        self.lap_start = Instant::now();
        lap
    }

    /// Completed laps in order
    pub fn laps(&self) -> &[(String, Duration)] {
        &self.laps
    }

    /// Whether the total exceeds the slow threshold
    pub fn is_slow(&self) -> bool {
        self.slow_threshold.map_or(false, |t| self.elapsed() > t)
    }

    /// Log the total with a message and return it
    pub fn finish(&self, message: impl Into<String>) -> Duration {
        let elapsed = self.elapsed();
        if self.is_slow() {
            warn!("{} {} in {:?} [SLOW] {}", self.name, message.into(), elapsed, self);
        } else {
            info!("{} {} in {:?}", self.name, message.into(), elapsed);
        }
        elapsed
    }
}

impl Display for Timer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let laps: Vec<String> = self
            .laps
            .iter()
            .map(|(name, d)| format!("{}={}ms", name, d.as_millis()))
            .collect();
        write!(f, "{}: [{}]", self.name, laps.join(" "))
    }
}
