use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::format::AudioFormat;

// Sub-modules
pub mod converter;
pub mod engine_stage;
pub mod quantizer;

// Re-exports
pub use converter::{ConversionMode, FormatConverterStage};
pub use engine_stage::{EngineStageMode, NativeEngineStage};
pub use quantizer::FrameBufferingStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Unconfigured,
    /// Configured, but the stage passes data through untouched.
    Configured,
    Active,
    Flushed,
}

/// Contract shared by every stage of the chain.
///
/// All buffers are interleaved PCM bytes in the stage's configured format.
pub trait AudioProcessor: Send {
    fn name(&self) -> &'static str;

    /// Configures the stage and returns its output format.
    /// An identical input format is a no-op returning the cached output format.
    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat>;

    fn state(&self) -> ProcessorState;

    fn is_active(&self) -> bool {
        matches!(self.state(), ProcessorState::Active | ProcessorState::Flushed)
    }

    /// Consumes all of `input`. Ignored while the stage is not active.
    fn queue_input(&mut self, input: &[u8]) -> Result<()>;

    /// Takes everything produced so far; empty when nothing is ready.
    fn get_output(&mut self) -> Vec<u8>;

    fn queue_end_of_stream(&mut self);

    /// Terminates the current stream without ending playback, e.g. on a codec switch.
    fn mark_stream_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_ended(&self) -> bool;

    /// Drops buffered data, keeps configuration and native handles.
    fn flush(&mut self);

    /// Releases native handles and returns to `Unconfigured`. Safe to repeat.
    fn reset(&mut self);
}

/// A processor behind a per-instance lock so a control thread can configure
/// or reset it while the data thread pumps buffers.
pub struct SharedProcessor<P> {
    inner: Arc<Mutex<P>>,
}

impl<P> Clone for SharedProcessor<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: AudioProcessor> SharedProcessor<P> {
    pub fn new(processor: P) -> Self {
        Self {
            inner: Arc::new(Mutex::new(processor)),
        }
    }

    /// Exclusive access for a sequence of calls.
    pub fn lock(&self) -> MutexGuard<'_, P> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: AudioProcessor> AudioProcessor for SharedProcessor<P> {
    fn name(&self) -> &'static str {
        self.lock().name()
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat> {
        self.lock().configure(input)
    }

    fn state(&self) -> ProcessorState {
        self.lock().state()
    }

    fn is_active(&self) -> bool {
        self.lock().is_active()
    }

    fn queue_input(&mut self, input: &[u8]) -> Result<()> {
        self.lock().queue_input(input)
    }

    fn get_output(&mut self) -> Vec<u8> {
        self.lock().get_output()
    }

    fn queue_end_of_stream(&mut self) {
        self.lock().queue_end_of_stream()
    }

    fn mark_stream_end(&mut self) -> Result<()> {
        self.lock().mark_stream_end()
    }

    fn is_ended(&self) -> bool {
        self.lock().is_ended()
    }

    fn flush(&mut self) {
        self.lock().flush()
    }

    fn reset(&mut self) {
        self.lock().reset()
    }
}

/// The closed set of stages a chain is built from.
pub enum Stage {
    FormatConverter(FormatConverterStage),
    FrameBuffering(FrameBufferingStage),
    NativeEngine(NativeEngineStage),
}

macro_rules! with_stage {
    ($stage:expr, $p:ident => $body:expr) => {
        match $stage {
            Stage::FormatConverter($p) => $body,
            Stage::FrameBuffering($p) => $body,
            Stage::NativeEngine($p) => $body,
        }
    };
}

impl AudioProcessor for Stage {
    fn name(&self) -> &'static str {
        with_stage!(self, p => p.name())
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat> {
        with_stage!(self, p => p.configure(input))
    }

    fn state(&self) -> ProcessorState {
        with_stage!(self, p => p.state())
    }

    fn is_active(&self) -> bool {
        with_stage!(self, p => p.is_active())
    }

    fn queue_input(&mut self, input: &[u8]) -> Result<()> {
        with_stage!(self, p => p.queue_input(input))
    }

    fn get_output(&mut self) -> Vec<u8> {
        with_stage!(self, p => p.get_output())
    }

    fn queue_end_of_stream(&mut self) {
        with_stage!(self, p => p.queue_end_of_stream())
    }

    fn mark_stream_end(&mut self) -> Result<()> {
        with_stage!(self, p => p.mark_stream_end())
    }

    fn is_ended(&self) -> bool {
        with_stage!(self, p => p.is_ended())
    }

    fn flush(&mut self) {
        with_stage!(self, p => p.flush())
    }

    fn reset(&mut self) {
        with_stage!(self, p => p.reset())
    }
}
