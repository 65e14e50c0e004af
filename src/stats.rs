use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::accumulator::FrameStatus;

/// Wall time spent inside one kind of native call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallTiming {
    pub calls: u64,
    pub total: Duration,
    pub max: Duration,
}

impl CallTiming {
    pub fn record(&mut self, elapsed: Duration) {
        self.calls += 1;
        self.total += elapsed;
        if elapsed > self.max {
            self.max = elapsed;
        }
    }

    pub fn avg_ms(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        as_ms(self.total) / self.calls as f64
    }

    pub fn max_ms(&self) -> f64 {
        as_ms(self.max)
    }
}

fn as_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

#[derive(Clone, Debug, Default)]
pub struct RuntimeStats {
    pub native_initializations: u64,
    pub native_process_calls: u64,
    pub native_failures: u64,
    pub reconfigure_skips: u64,

    pub frames_start: u64,
    pub frames_middle: u64,
    pub frames_end: u64,
    pub padded_frames: u64,

    pub decoded_units: u64,
    pub invalid_data_units: u64,
    pub decode_errors: u64,

    pub bytes_in: u64,
    pub bytes_out: u64,

    pub engine_process: CallTiming,
    pub decode: CallTiming,
}

impl RuntimeStats {
    pub fn record_frame(&mut self, status: FrameStatus, padded: bool) {
        match status {
            FrameStatus::Start => self.frames_start += 1,
            FrameStatus::Middle => self.frames_middle += 1,
            FrameStatus::End => self.frames_end += 1,
        }
        if padded {
            self.padded_frames += 1;
        }
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_start + self.frames_middle + self.frames_end
    }
}

/// Counters shared between the data thread and whoever reports them.
#[derive(Clone, Default)]
pub struct RuntimeStatsHandle {
    inner: Arc<Mutex<RuntimeStats>>,
}

impl RuntimeStatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeStats> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update(&self, f: impl FnOnce(&mut RuntimeStats)) {
        f(&mut self.lock());
    }

    pub fn snapshot(&self) -> RuntimeStats {
        self.lock().clone()
    }

    pub fn clear(&self) {
        *self.lock() = RuntimeStats::default();
    }
}

/// Millisecond view of [`RuntimeStats`] for reporting.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsSummary {
    pub frames: u64,
    pub padded_frames: u64,
    pub native_process_calls: u64,
    pub reconfigure_skips: u64,
    pub invalid_data_units: u64,
    pub decode_errors: u64,
    pub engine_avg_ms: f64,
    pub engine_max_ms: f64,
    pub decode_avg_ms: f64,
    pub decode_max_ms: f64,
}

impl StatsSummary {
    pub fn from_runtime(s: &RuntimeStats) -> Self {
        Self {
            frames: s.frames_total(),
            padded_frames: s.padded_frames,
            native_process_calls: s.native_process_calls,
            reconfigure_skips: s.reconfigure_skips,
            invalid_data_units: s.invalid_data_units,
            decode_errors: s.decode_errors,
            engine_avg_ms: s.engine_process.avg_ms(),
            engine_max_ms: s.engine_process.max_ms(),
            decode_avg_ms: s.decode.avg_ms(),
            decode_max_ms: s.decode.max_ms(),
        }
    }
}
