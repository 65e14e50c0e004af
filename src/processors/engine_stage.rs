use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, trace, warn};

use super::{AudioProcessor, ProcessorState};
use crate::accumulator::FrameAccumulator;
use crate::config::{CoefficientPaths, ProcessingConfig};
use crate::engine::{EngineInit, EngineInput, EngineSession, NativeCodecEngine, RESULT_INVALID_DATA};
use crate::error::{Error, Result};
use crate::format::{AudioFormat, PcmEncoding};
use crate::stats::RuntimeStatsHandle;

const FLOAT_BYTES: usize = std::mem::size_of::<f32>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStageMode {
    /// Fixed frames with stream boundary tags; the engine fixes the output channel count.
    Framed { output_channels: u16 },
    /// Whole input buffers processed as they arrive; output format equals input format.
    InPlace,
}

/// Drives one native DSP engine session from the chain.
pub struct NativeEngineStage {
    name: &'static str,
    engine: Arc<dyn NativeCodecEngine>,
    mode: EngineStageMode,
    frame_size: usize,
    coefficients: Option<CoefficientPaths>,
    session: Option<EngineSession>,
    input: AudioFormat,
    output: AudioFormat,
    state: ProcessorState,
    accumulator: FrameAccumulator,
    // Reused engine output slot
    frame_output: Vec<f32>,
    carry: Vec<u8>,
    pending: Vec<u8>,
    stats: RuntimeStatsHandle,
}

impl NativeEngineStage {
    pub fn new(
        name: &'static str,
        engine: Arc<dyn NativeCodecEngine>,
        mode: EngineStageMode,
        frame_size: usize,
        coefficients: Option<CoefficientPaths>,
        stats: RuntimeStatsHandle,
    ) -> Self {
        Self {
            name,
            engine,
            mode,
            frame_size,
            coefficients,
            session: None,
            input: AudioFormat::NOT_SET,
            output: AudioFormat::NOT_SET,
            state: ProcessorState::Unconfigured,
            accumulator: FrameAccumulator::new(frame_size, AudioFormat::NOT_SET),
            frame_output: Vec::new(),
            carry: Vec::new(),
            pending: Vec::new(),
            stats,
        }
    }

    /// 3D audio virtualizer: many input channels rendered to a fixed output layout.
    pub fn virtualizer(
        engine: Arc<dyn NativeCodecEngine>,
        config: &ProcessingConfig,
        stats: RuntimeStatsHandle,
    ) -> Self {
        Self::new(
            "virtualizer",
            engine,
            EngineStageMode::Framed {
                output_channels: config.virtualizer_output_channels,
            },
            config.frame_size,
            Some(config.coefficient_paths()),
            stats,
        )
    }

    /// Auto level control.
    pub fn alc(
        engine: Arc<dyn NativeCodecEngine>,
        config: &ProcessingConfig,
        stats: RuntimeStatsHandle,
    ) -> Self {
        Self::new(
            "alc",
            engine,
            EngineStageMode::InPlace,
            config.frame_size,
            None,
            stats,
        )
    }

    pub fn mode(&self) -> EngineStageMode {
        self.mode
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn output_format_for(&self, input: AudioFormat) -> AudioFormat {
        match self.mode {
            EngineStageMode::Framed { output_channels } => input.with_channels(output_channels),
            EngineStageMode::InPlace => input,
        }
    }

    fn process_ready_frame(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            self.accumulator.clear();
            return Ok(());
        };
        let frame = self.accumulator.prepare_frame();
        let status = frame.status;
        let padded = frame.is_padded();
        let started = Instant::now();
        let code = session.process(
            EngineInput::Frame {
                samples: frame.samples,
                status,
                valid_samples: frame.valid_samples,
                silence_flags: frame.silence_flags,
            },
            &mut self.frame_output,
        );
        let elapsed = started.elapsed();
        self.accumulator.clear();
        self.stats.update(|s| {
            s.native_process_calls += 1;
            s.engine_process.record(elapsed);
            s.record_frame(status, padded);
        });
        self.absorb_result(code)
    }

    fn drop_carry(&mut self) {
        if !self.carry.is_empty() {
            trace!(stage = self.name, dropped = self.carry.len(), "partial trailing sample");
            self.carry.clear();
        }
    }

    fn process_block(&mut self, input: &[u8]) -> Result<()> {
        let mut joined;
        let bytes = if self.carry.is_empty() {
            input
        } else {
            joined = std::mem::take(&mut self.carry);
            joined.extend_from_slice(input);
            &joined[..]
        };
        let whole = bytes.len() - bytes.len() % FLOAT_BYTES;
        self.carry = bytes[whole..].to_vec();
        if whole == 0 {
            return Ok(());
        }
        let samples: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes[..whole]);
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        self.frame_output.resize(samples.len(), 0.0);
        let started = Instant::now();
        let code = session.process(EngineInput::Block { samples: &samples }, &mut self.frame_output);
        let elapsed = started.elapsed();
        self.stats.update(|s| {
            s.native_process_calls += 1;
            s.engine_process.record(elapsed);
        });
        self.absorb_result(code)
    }

    fn absorb_result(&mut self, code: i32) -> Result<()> {
        match code {
            RESULT_INVALID_DATA => {
                warn!(stage = self.name, "engine reported invalid data, frame dropped");
                self.stats.update(|s| s.invalid_data_units += 1);
                Ok(())
            }
            c if c < 0 => {
                error!(stage = self.name, code = c, "native process failed");
                self.stats.update(|s| s.native_failures += 1);
                Err(Error::Process {
                    stage: self.name,
                    code: c,
                })
            }
            n => {
                let n = (n as usize).min(self.frame_output.len());
                self.pending
                    .extend_from_slice(bytemuck::cast_slice::<f32, u8>(&self.frame_output[..n]));
                self.stats.update(|s| s.bytes_out += (n * FLOAT_BYTES) as u64);
                Ok(())
            }
        }
    }
}

impl AudioProcessor for NativeEngineStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat> {
        if input == self.input && self.session.is_some() {
            debug!(stage = self.name, %input, "format unchanged, keeping native session");
            self.stats.update(|s| s.reconfigure_skips += 1);
            return Ok(self.output);
        }
        if input.encoding != PcmEncoding::PcmFloat || input.channel_count == 0 {
            return Err(Error::UnsupportedFormat(input));
        }

        // Old handle goes before the new one is created.
        self.session = None;
        self.state = ProcessorState::Unconfigured;
        self.input = AudioFormat::NOT_SET;
        self.output = AudioFormat::NOT_SET;

        let init = EngineInit {
            sample_rate_hz: input.sample_rate_hz,
            channel_count: input.channel_count,
            frame_size: self.frame_size,
            coefficients: self.coefficients.clone(),
            ..EngineInit::default()
        };
        let session = EngineSession::open(Arc::clone(&self.engine), init)?;
        self.stats.update(|s| s.native_initializations += 1);

        let output = self.output_format_for(input);
        self.accumulator.set_format(input);
        self.accumulator.reset_boundaries();
        self.frame_output = match self.mode {
            EngineStageMode::Framed { output_channels } => {
                vec![0.0; self.frame_size * output_channels as usize]
            }
            EngineStageMode::InPlace => Vec::new(),
        };
        self.carry.clear();
        self.pending.clear();
        self.session = Some(session);
        self.input = input;
        self.output = output;
        self.state = ProcessorState::Active;
        debug!(stage = self.name, %input, %output, "native engine stage configured");
        Ok(output)
    }

    fn state(&self) -> ProcessorState {
        self.state
    }

    fn queue_input(&mut self, input: &[u8]) -> Result<()> {
        if !self.is_active() || input.is_empty() {
            return Ok(());
        }
        self.stats.update(|s| s.bytes_in += input.len() as u64);
        match self.mode {
            EngineStageMode::InPlace => self.process_block(input),
            EngineStageMode::Framed { .. } => {
                let mut rest = input;
                while !rest.is_empty() {
                    let taken = self.accumulator.append(rest);
                    rest = &rest[taken..];
                    if self.accumulator.is_ready_to_process() {
                        self.process_ready_frame()?;
                    }
                }
                Ok(())
            }
        }
    }

    fn get_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    fn queue_end_of_stream(&mut self) {
        debug!(stage = self.name, "end of stream queued");
    }

    fn mark_stream_end(&mut self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        match self.mode {
            EngineStageMode::Framed { .. } => {
                self.accumulator.mark_stream_end();
                self.process_ready_frame()
            }
            EngineStageMode::InPlace => {
                self.drop_carry();
                Ok(())
            }
        }
    }

    fn is_ended(&self) -> bool {
        true
    }

    fn flush(&mut self) {
        self.accumulator.reset_boundaries();
        self.drop_carry();
        self.pending.clear();
        if let (EngineStageMode::Framed { .. }, Some(session)) = (self.mode, self.session.as_mut()) {
            if let Err(e) = session.reset() {
                error!(stage = self.name, error = %e, "native reset failed, session dropped");
                self.stats.update(|s| s.native_failures += 1);
                self.session = None;
                self.input = AudioFormat::NOT_SET;
                self.output = AudioFormat::NOT_SET;
                self.state = ProcessorState::Unconfigured;
                return;
            }
        }
        if self.state == ProcessorState::Active {
            self.state = ProcessorState::Flushed;
        }
    }

    fn reset(&mut self) {
        self.session = None;
        self.accumulator.reset_boundaries();
        self.carry.clear();
        self.pending.clear();
        self.input = AudioFormat::NOT_SET;
        self.output = AudioFormat::NOT_SET;
        self.state = ProcessorState::Unconfigured;
    }
}
