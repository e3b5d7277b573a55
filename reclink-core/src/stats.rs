//! Stream statistics sampler.
//!
//! The engine only exposes cumulative counters. The sampler turns two
//! consecutive readings into a bitrate, and the frame counters into a
//! drop percentage relative to the moment streaming started.

use std::fmt;
use std::time::Instant;

use crate::engine::StreamStats;

/// Shorter gaps than this report a bitrate of zero.
const MIN_SAMPLE_SECS: f64 = 0.01;

/// One derived reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSample {
    pub kbps: f64,
    /// Frames since streaming started.
    pub frames: u32,
    /// Dropped frames since streaming started.
    pub dropped: u32,
    pub drop_percent: f64,
}

impl fmt::Display for StreamSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bitrate: {:.2} kb/s, frames: {} / {} ({:.2}%)",
            self.kbps, self.dropped, self.frames, self.drop_percent
        )
    }
}

/// Rolling state between two `LogStreamStats` requests.
#[derive(Debug, Clone)]
pub struct StreamStatsSampler {
    first_total: u32,
    first_dropped: u32,
    last_bytes: u64,
    last_at: Instant,
}

impl StreamStatsSampler {
    /// Baseline taken right after the stream start was accepted.
    pub fn start(baseline: StreamStats) -> Self {
        Self::start_at(Instant::now(), baseline)
    }

    /// Start with an explicit timestamp (useful for testing).
    pub fn start_at(now: Instant, baseline: StreamStats) -> Self {
        Self {
            first_total: baseline.total_frames,
            first_dropped: baseline.dropped_frames,
            last_bytes: baseline.total_bytes,
            last_at: now,
        }
    }

    pub fn sample(&mut self, stats: StreamStats) -> StreamSample {
        self.sample_at(Instant::now(), stats)
    }

    /// Sample with an explicit timestamp (useful for testing).
    pub fn sample_at(&mut self, now: Instant, stats: StreamStats) -> StreamSample {
        // Counters went backwards: the output was recreated.
        let mut bytes = stats.total_bytes;
        if bytes < self.last_bytes {
            bytes = 0;
        }
        if bytes == 0 {
            self.last_bytes = 0;
        }

        let secs = now.saturating_duration_since(self.last_at).as_secs_f64();
        let kbps = if secs < MIN_SAMPLE_SECS {
            0.0
        } else {
            (bytes - self.last_bytes) as f64 * 8.0 / secs / 1000.0
        };

        if stats.total_frames < self.first_total || stats.dropped_frames < self.first_dropped {
            self.first_total = 0;
            self.first_dropped = 0;
        }
        let frames = stats.total_frames - self.first_total;
        let dropped = stats.dropped_frames - self.first_dropped;
        let drop_percent = if frames == 0 {
            0.0
        } else {
            dropped as f64 / frames as f64 * 100.0
        };

        self.last_bytes = bytes;
        self.last_at = now;

        StreamSample {
            kbps,
            frames,
            dropped,
            drop_percent,
        }
    }
}
