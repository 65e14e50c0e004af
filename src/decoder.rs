//! Request/response decoder around a native compressed-audio session.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::{CoefficientPaths, ProcessingConfig};
use crate::convert::{float_to_pcm, Int16Clamp};
use crate::engine::{
    EngineInit, EngineInput, EngineSession, NativeCodecEngine, RESULT_INVALID_DATA,
};
use crate::error::{Error, Result};
use crate::format::{AudioFormat, PcmEncoding};
use crate::registry::{EngineKind, EngineRegistry, MIME_MHA1};
use crate::stats::RuntimeStatsHandle;

/// Highest channel count the decoder can emit.
pub const MAX_OUTPUT_CHANNELS: usize = 14;
/// Float samples in one decoded unit: 32 ms of 48 kHz audio at the maximum channel count.
pub const OUTPUT_BUFFER_SAMPLES: usize = 32 * 48 * MAX_OUTPUT_CHANNELS;

#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    pub mime_type: String,
    /// Codec-specific initialization data from the container.
    pub initialization_data: Vec<Vec<u8>>,
    pub output_encoding: PcmEncoding,
    pub int16_clamp: Int16Clamp,
    pub coefficients: Option<CoefficientPaths>,
}

impl DecoderConfig {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            initialization_data: Vec::new(),
            output_encoding: PcmEncoding::PcmFloat,
            int16_clamp: Int16Clamp::default(),
            coefficients: None,
        }
    }

    pub fn from_processing(
        mime_type: impl Into<String>,
        initialization_data: Vec<Vec<u8>>,
        config: &ProcessingConfig,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            initialization_data,
            output_encoding: config.decoder_output_encoding,
            int16_clamp: config.int16_clamp,
            coefficients: Some(config.coefficient_paths()),
        }
    }

    /// Extra data handed to the engine; only `audio/mha1` carries it.
    fn extra_data(&self) -> Result<Option<Vec<u8>>> {
        if self.mime_type != MIME_MHA1 {
            return Ok(None);
        }
        self.initialization_data
            .first()
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                Error::InitializationFailed(format!("{} requires initialization data", self.mime_type))
            })
    }
}

/// One compressed access unit.
#[derive(Debug, Clone, Copy)]
pub struct DecoderInput<'a> {
    pub data: &'a [u8],
    pub time_us: i64,
    pub end_of_stream: bool,
}

impl<'a> DecoderInput<'a> {
    pub fn new(data: &'a [u8], time_us: i64) -> Self {
        Self {
            data,
            time_us,
            end_of_stream: false,
        }
    }

    pub fn end_of_stream(time_us: i64) -> Self {
        Self {
            data: &[],
            time_us,
            end_of_stream: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    pub time_us: i64,
    pub data: Vec<u8>,
    pub encoding: PcmEncoding,
}

impl DecodedBuffer {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    /// A native error occurred; only a decode with `reset` continues the session.
    Failed,
    Released,
}

pub struct Decoder {
    name: String,
    engine: Arc<dyn NativeCodecEngine>,
    init: EngineInit,
    session: Option<EngineSession>,
    state: SessionState,
    output_encoding: PcmEncoding,
    int16_clamp: Int16Clamp,
    channel_count: Option<u16>,
    sample_rate: Option<u32>,
    scratch: Vec<f32>,
    stats: RuntimeStatsHandle,
}

impl Decoder {
    pub fn create_session(
        registry: &EngineRegistry,
        config: DecoderConfig,
        stats: RuntimeStatsHandle,
    ) -> Result<Self> {
        let codec = EngineRegistry::codec_name(&config.mime_type).ok_or_else(|| {
            Error::InitializationFailed(format!("unsupported MIME type {}", config.mime_type))
        })?;
        if !matches!(
            config.output_encoding,
            PcmEncoding::PcmFloat | PcmEncoding::Pcm16 | PcmEncoding::Pcm8
        ) {
            return Err(Error::Config(format!(
                "decoder output encoding {:?} is not supported",
                config.output_encoding
            )));
        }
        let engine = registry.require(EngineKind::Decoder)?;
        let init = EngineInit {
            codec: Some(codec.to_string()),
            extra_data: config.extra_data()?,
            coefficients: config.coefficients.clone(),
            ..EngineInit::default()
        };
        let name = format!("mpegh{}-{}", engine.version(), codec);
        let session = EngineSession::open(Arc::clone(&engine), init.clone())?;
        stats.update(|s| s.native_initializations += 1);
        info!(decoder = %name, encoding = ?config.output_encoding, "decoder session created");

        Ok(Self {
            name,
            engine,
            init,
            session: Some(session),
            state: SessionState::Ready,
            output_encoding: config.output_encoding,
            int16_clamp: config.int16_clamp,
            channel_count: None,
            sample_rate: None,
            scratch: vec![0.0; OUTPUT_BUFFER_SAMPLES],
            stats,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn output_encoding(&self) -> PcmEncoding {
        self.output_encoding
    }

    /// Known only after the first successful decode.
    pub fn channel_count(&self) -> Option<u16> {
        self.channel_count
    }

    /// Known only after the first successful decode.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn output_format(&self) -> Option<AudioFormat> {
        Some(AudioFormat::new(
            self.sample_rate?,
            self.channel_count?,
            self.output_encoding,
        ))
    }

    fn empty_output(&self, time_us: i64) -> DecodedBuffer {
        DecodedBuffer {
            time_us,
            data: Vec::new(),
            encoding: self.output_encoding,
        }
    }

    /// Resets the native state with the original init data, reopening the
    /// session if a previous reset lost the handle.
    fn reset_session(&mut self) -> Result<()> {
        let result = match self.session.as_mut() {
            Some(session) if session.is_valid() => session.reset(),
            _ => EngineSession::open(Arc::clone(&self.engine), self.init.clone())
                .map(|session| self.session = Some(session)),
        };
        if result.is_err() {
            self.session = None;
        }
        result
    }

    pub fn decode(&mut self, input: &DecoderInput<'_>, reset: bool) -> Result<DecodedBuffer> {
        if self.state == SessionState::Released {
            return Err(Error::Decode(format!("{} has been released", self.name)));
        }
        if reset {
            if let Err(e) = self.reset_session() {
                error!(decoder = %self.name, error = %e, "decoder reset failed");
                self.state = SessionState::Failed;
                self.stats.update(|s| s.decode_errors += 1);
                return Err(Error::Decode(format!("error resetting: {e}")));
            }
            debug!(decoder = %self.name, "decoder reset");
            self.state = SessionState::Ready;
        }
        if self.state == SessionState::Failed {
            return Err(Error::Decode(format!(
                "{} failed earlier, decode with reset required",
                self.name
            )));
        }
        if input.data.is_empty() {
            return Ok(self.empty_output(input.time_us));
        }
        let Some(session) = self.session.as_mut() else {
            return Err(Error::Decode(format!("{} has no native session", self.name)));
        };

        let started = Instant::now();
        let code = session.process(EngineInput::Compressed { data: input.data }, &mut self.scratch);
        let elapsed = started.elapsed();
        self.stats.update(|s| {
            s.native_process_calls += 1;
            s.decode.record(elapsed);
            s.bytes_in += input.data.len() as u64;
        });

        match code {
            RESULT_INVALID_DATA => {
                warn!(decoder = %self.name, time_us = input.time_us, "invalid access unit skipped");
                self.stats.update(|s| s.invalid_data_units += 1);
                Ok(self.empty_output(input.time_us))
            }
            c if c < 0 => {
                error!(decoder = %self.name, code = c, "native decode failed");
                self.state = SessionState::Failed;
                self.stats.update(|s| s.decode_errors += 1);
                Err(Error::Decode(format!("error decoding, code {c}")))
            }
            n => {
                if self.channel_count.is_none() {
                    self.channel_count = session.channel_count();
                    self.sample_rate = session.sample_rate();
                    debug!(
                        decoder = %self.name,
                        channels = ?self.channel_count,
                        sample_rate = ?self.sample_rate,
                        "decoder output format known"
                    );
                }
                let n = (n as usize).min(self.scratch.len());
                let data = float_to_pcm(&self.scratch[..n], self.output_encoding, self.int16_clamp)
                    .ok_or(Error::UnsupportedFormat(AudioFormat::NOT_SET.with_encoding(self.output_encoding)))?;
                self.stats.update(|s| {
                    s.decoded_units += 1;
                    s.bytes_out += data.len() as u64;
                });
                Ok(DecodedBuffer {
                    time_us: input.time_us,
                    data,
                    encoding: self.output_encoding,
                })
            }
        }
    }

    /// Releases the native session. Safe to repeat.
    pub fn release(&mut self) {
        if self.session.take().is_some() {
            debug!(decoder = %self.name, "decoder released");
        }
        self.state = SessionState::Released;
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.release();
    }
}
