//! Noise suppression from `webrtc-audio-processing` behind the native engine contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};
use webrtc_audio_processing::config::{HighPassFilter, NoiseSuppression, NoiseSuppressionLevel};
use webrtc_audio_processing::{Config, Processor};

use super::{EngineInit, EngineInput, NativeCodecEngine, RawHandle, NULL_HANDLE, RESULT_ERROR_OTHER, RESULT_INVALID_DATA};

pub const SAMPLE_RATE_HZ: u32 = 48_000;
/// 10 ms at 48 kHz.
pub const FRAME_SIZE: usize = 480;

/// Mono 48 kHz noise suppressor. Each handle owns one WebRTC processor.
#[derive(Default)]
pub struct WebRtcNoiseEngine {
    processors: Mutex<HashMap<RawHandle, Processor>>,
    next_handle: AtomicU64,
}

impl WebRtcNoiseEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn processors(&self) -> MutexGuard<'_, HashMap<RawHandle, Processor>> {
        self.processors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_apm(&self) -> Option<Processor> {
        let apm = match Processor::new(SAMPLE_RATE_HZ) {
            Ok(apm) => apm,
            Err(e) => {
                error!(error = ?e, "failed to create WebRTC processor");
                return None;
            }
        };

        let mut config = Config::default();
        config.high_pass_filter = Some(HighPassFilter::default());
        config.noise_suppression = Some(NoiseSuppression {
            level: NoiseSuppressionLevel::High,
            analyze_linear_aec_output: false,
        });
        // Pure NS
        config.echo_canceller = None;
        config.gain_controller = None;

        apm.set_config(config);
        Some(apm)
    }
}

impl NativeCodecEngine for WebRtcNoiseEngine {
    fn name(&self) -> &str {
        "webrtc-ns"
    }

    fn version(&self) -> String {
        "2".to_string()
    }

    fn initialize(&self, init: &EngineInit) -> RawHandle {
        if init.sample_rate_hz != SAMPLE_RATE_HZ || init.channel_count != 1 || init.frame_size != FRAME_SIZE {
            warn!(
                sample_rate = init.sample_rate_hz,
                channels = init.channel_count,
                frame_size = init.frame_size,
                "WebRTC NS expects 48kHz mono 480-sample frames"
            );
            return NULL_HANDLE;
        }
        let Some(apm) = self.create_apm() else {
            return NULL_HANDLE;
        };
        // Zero is the null handle
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.processors().insert(handle, apm);
        debug!(handle, "WebRTC NS initialized");
        handle
    }

    fn process(&self, handle: RawHandle, input: EngineInput<'_>, output: &mut [f32]) -> i32 {
        let samples = match input {
            EngineInput::Frame { samples, .. } | EngineInput::Block { samples } => samples,
            EngineInput::Compressed { .. } => return RESULT_INVALID_DATA,
        };
        let mut processors = self.processors();
        let Some(apm) = processors.get_mut(&handle) else {
            return RESULT_ERROR_OTHER;
        };
        let expected = apm.num_samples_per_frame();
        if samples.len() != expected || output.len() < expected {
            warn!(expected, got = samples.len(), "NS frame size mismatch");
            return RESULT_INVALID_DATA;
        }
        let out = &mut output[..expected];
        out.copy_from_slice(samples);
        match apm.process_capture_frame([out]) {
            Ok(()) => expected as i32,
            Err(e) => {
                error!(error = %e, "NS processing error");
                RESULT_ERROR_OTHER
            }
        }
    }

    fn reset(&self, handle: RawHandle, _init: &EngineInit) -> RawHandle {
        let Some(apm) = self.create_apm() else {
            self.processors().remove(&handle);
            return NULL_HANDLE;
        };
        let mut processors = self.processors();
        if !processors.contains_key(&handle) {
            return NULL_HANDLE;
        }
        processors.insert(handle, apm);
        handle
    }

    fn release(&self, handle: RawHandle) {
        self.processors().remove(&handle);
    }

    fn channel_count(&self, handle: RawHandle) -> i32 {
        if self.processors().contains_key(&handle) {
            1
        } else {
            0
        }
    }

    fn sample_rate(&self, handle: RawHandle) -> i32 {
        if self.processors().contains_key(&handle) {
            SAMPLE_RATE_HZ as i32
        } else {
            0
        }
    }
}
