use tracing::{debug, trace};

use super::{AudioProcessor, ProcessorState};
use crate::convert::{float_to_pcm, pcm_to_float, Int16Clamp};
use crate::error::{Error, Result};
use crate::format::{AudioFormat, PcmEncoding};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// Integer PCM in, float out. Float input passes through.
    ToFloat,
    /// Float in, 16-bit PCM out.
    ToInt16(Int16Clamp),
}

/// Stateless sample conversion at the edges of the engine stages.
pub struct FormatConverterStage {
    mode: ConversionMode,
    input: AudioFormat,
    output: AudioFormat,
    state: ProcessorState,
    /// Partial sample carried to the next `queue_input`.
    carry: Vec<u8>,
    pending: Vec<u8>,
    ended: bool,
}

impl FormatConverterStage {
    pub fn new(mode: ConversionMode) -> Self {
        Self {
            mode,
            input: AudioFormat::NOT_SET,
            output: AudioFormat::NOT_SET,
            state: ProcessorState::Unconfigured,
            carry: Vec::new(),
            pending: Vec::new(),
            ended: false,
        }
    }

    pub fn to_float() -> Self {
        Self::new(ConversionMode::ToFloat)
    }

    pub fn to_int16(clamp: Int16Clamp) -> Self {
        Self::new(ConversionMode::ToInt16(clamp))
    }

    pub fn mode(&self) -> ConversionMode {
        self.mode
    }

    fn drop_carry(&mut self) {
        if !self.carry.is_empty() {
            trace!(dropped = self.carry.len(), "partial trailing sample");
            self.carry.clear();
        }
    }

    fn convert(&self, input: &[u8]) -> Vec<u8> {
        let samples = pcm_to_float(input, self.input.encoding);
        match self.mode {
            ConversionMode::ToFloat => bytemuck::cast_slice::<f32, u8>(&samples).to_vec(),
            ConversionMode::ToInt16(clamp) => {
                float_to_pcm(&samples, PcmEncoding::Pcm16, clamp).unwrap_or_default()
            }
        }
    }
}

impl AudioProcessor for FormatConverterStage {
    fn name(&self) -> &'static str {
        "format_converter"
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat> {
        if input == self.input && self.state != ProcessorState::Unconfigured {
            return Ok(self.output);
        }
        let (output, state) = match self.mode {
            ConversionMode::ToFloat => match input.encoding {
                PcmEncoding::PcmFloat => (input, ProcessorState::Configured),
                e if e.is_integer() => (
                    input.with_encoding(PcmEncoding::PcmFloat),
                    ProcessorState::Active,
                ),
                _ => return Err(Error::UnsupportedFormat(input)),
            },
            ConversionMode::ToInt16(_) => match input.encoding {
                PcmEncoding::PcmFloat => (
                    input.with_encoding(PcmEncoding::Pcm16),
                    ProcessorState::Active,
                ),
                PcmEncoding::Pcm16 => (input, ProcessorState::Configured),
                _ => return Err(Error::UnsupportedFormat(input)),
            },
        };
        debug!(%input, %output, mode = ?self.mode, "format converter configured");
        self.input = input;
        self.output = output;
        self.state = state;
        self.carry.clear();
        self.pending.clear();
        self.ended = false;
        Ok(output)
    }

    fn state(&self) -> ProcessorState {
        self.state
    }

    fn queue_input(&mut self, input: &[u8]) -> Result<()> {
        if !self.is_active() || input.is_empty() {
            return Ok(());
        }
        let width = self.input.encoding.bytes_per_sample();
        let converted = if self.carry.is_empty() && input.len() % width == 0 {
            self.convert(input)
        } else {
            let mut joined = std::mem::take(&mut self.carry);
            joined.extend_from_slice(input);
            let whole = joined.len() - joined.len() % width;
            self.carry = joined.split_off(whole);
            self.convert(&joined)
        };
        self.pending.extend_from_slice(&converted);
        Ok(())
    }

    fn get_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    fn queue_end_of_stream(&mut self) {
        self.ended = true;
    }

    /// A split sample cannot continue into the next stream.
    fn mark_stream_end(&mut self) -> Result<()> {
        self.drop_carry();
        Ok(())
    }

    fn is_ended(&self) -> bool {
        self.ended && self.pending.is_empty()
    }

    fn flush(&mut self) {
        self.drop_carry();
        self.pending.clear();
        self.ended = false;
        if self.state == ProcessorState::Active {
            self.state = ProcessorState::Flushed;
        }
    }

    fn reset(&mut self) {
        self.flush();
        self.input = AudioFormat::NOT_SET;
        self.output = AudioFormat::NOT_SET;
        self.state = ProcessorState::Unconfigured;
    }
}
