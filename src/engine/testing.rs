//! Scriptable in-process engine used by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{EngineInit, EngineInput, NativeCodecEngine, RawHandle, NULL_HANDLE, RESULT_ERROR_OTHER};
use crate::accumulator::FrameStatus;

#[derive(Default)]
pub struct CallCounts {
    initialize: AtomicUsize,
    process: AtomicUsize,
    reset: AtomicUsize,
    release: AtomicUsize,
}

impl CallCounts {
    pub fn initialize(&self) -> usize {
        self.initialize.load(Ordering::SeqCst)
    }
    pub fn process(&self) -> usize {
        self.process.load(Ordering::SeqCst)
    }
    pub fn reset(&self) -> usize {
        self.reset.load(Ordering::SeqCst)
    }
    pub fn release(&self) -> usize {
        self.release.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub status: FrameStatus,
    pub valid_samples: usize,
    pub samples: Vec<f32>,
}

/// Frames: copies input channel `c % in` to output channel `c`.
/// Blocks: scaled by `gain`. Compressed units: raw native-endian f32 samples.
pub struct StubEngine {
    counts: CallCounts,
    output_channels: u16,
    input_channels: Mutex<u16>,
    next_handle: AtomicU64,
    fail_initialize: AtomicBool,
    fail_reset: AtomicBool,
    scripted: Mutex<VecDeque<i32>>,
    frames: Mutex<Vec<RecordedFrame>>,
    last_reset_init: Mutex<Option<EngineInit>>,
    gain: Mutex<f32>,
}

impl StubEngine {
    pub fn new(output_channels: u16) -> Arc<Self> {
        Arc::new(Self {
            counts: CallCounts::default(),
            output_channels,
            input_channels: Mutex::new(0),
            next_handle: AtomicU64::new(1),
            fail_initialize: AtomicBool::new(false),
            fail_reset: AtomicBool::new(false),
            scripted: Mutex::new(VecDeque::new()),
            frames: Mutex::new(Vec::new()),
            last_reset_init: Mutex::new(None),
            gain: Mutex::new(1.0),
        })
    }

    pub fn counts(&self) -> &CallCounts {
        &self.counts
    }

    pub fn fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reset(&self, fail: bool) {
        self.fail_reset.store(fail, Ordering::SeqCst);
    }

    /// The next `process` calls return these codes instead of processing.
    pub fn script_results(&self, codes: &[i32]) {
        self.scripted.lock().unwrap().extend(codes.iter().copied());
    }

    pub fn set_gain(&self, gain: f32) {
        *self.gain.lock().unwrap() = gain;
    }

    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn last_reset_init(&self) -> Option<EngineInit> {
        self.last_reset_init.lock().unwrap().clone()
    }
}

impl NativeCodecEngine for StubEngine {
    fn name(&self) -> &str {
        "stub"
    }

    fn version(&self) -> String {
        "1.2.3".to_string()
    }

    fn initialize(&self, init: &EngineInit) -> RawHandle {
        self.counts.initialize.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize.load(Ordering::SeqCst) {
            return NULL_HANDLE;
        }
        *self.input_channels.lock().unwrap() = init.channel_count;
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    fn process(&self, _handle: RawHandle, input: EngineInput<'_>, output: &mut [f32]) -> i32 {
        self.counts.process.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = self.scripted.lock().unwrap().pop_front() {
            return code;
        }
        match input {
            EngineInput::Frame {
                samples,
                status,
                valid_samples,
                silence_flags,
            } => {
                self.frames.lock().unwrap().push(RecordedFrame {
                    status,
                    valid_samples,
                    samples: samples.to_vec(),
                });
                silence_flags.fill(true);
                let in_ch = (*self.input_channels.lock().unwrap()).max(1) as usize;
                let out_ch = self.output_channels as usize;
                let frames = samples.len() / in_ch;
                if frames * out_ch > output.len() {
                    return RESULT_ERROR_OTHER;
                }
                for i in 0..frames {
                    for c in 0..out_ch {
                        output[i * out_ch + c] = samples[i * in_ch + c % in_ch];
                    }
                }
                (frames * out_ch) as i32
            }
            EngineInput::Block { samples } => {
                let gain = *self.gain.lock().unwrap();
                if samples.len() > output.len() {
                    return RESULT_ERROR_OTHER;
                }
                for (o, s) in output.iter_mut().zip(samples) {
                    *o = s * gain;
                }
                samples.len() as i32
            }
            EngineInput::Compressed { data } => {
                let samples = bytemuck::pod_collect_to_vec::<u8, f32>(data);
                if samples.len() > output.len() {
                    return RESULT_ERROR_OTHER;
                }
                output[..samples.len()].copy_from_slice(&samples);
                samples.len() as i32
            }
        }
    }

    fn reset(&self, handle: RawHandle, init: &EngineInit) -> RawHandle {
        self.counts.reset.fetch_add(1, Ordering::SeqCst);
        *self.last_reset_init.lock().unwrap() = Some(init.clone());
        if self.fail_reset.load(Ordering::SeqCst) {
            NULL_HANDLE
        } else {
            handle
        }
    }

    fn release(&self, _handle: RawHandle) {
        self.counts.release.fetch_add(1, Ordering::SeqCst);
    }

    fn channel_count(&self, _handle: RawHandle) -> i32 {
        self.output_channels as i32
    }

    fn sample_rate(&self, _handle: RawHandle) -> i32 {
        48_000
    }
}
