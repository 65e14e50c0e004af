//! Fixed-frame PCM buffering, sample format conversion and decoder sessions
//! for opaque native spatial-audio, auto-level-control and MPEG-H engines.
//!
//! Audio enters a [`ProcessorChain`] as interleaved PCM bytes of any size,
//! is converted to float, reshaped into the fixed frames a native engine
//! requires and handed to it through [`NativeCodecEngine`]. Compressed
//! units go through a [`Decoder`] session first.

pub mod accumulator;
pub mod chain;
pub mod config;
pub mod convert;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod processors;
pub mod registry;
pub mod stats;

pub use accumulator::{FrameAccumulator, FrameStatus};
pub use chain::ProcessorChain;
pub use config::{CoefType, CoefficientPaths, ProcessingConfig};
pub use convert::Int16Clamp;
pub use decoder::{DecodedBuffer, Decoder, DecoderConfig, DecoderInput};
pub use engine::{EngineInit, EngineInput, EngineSession, NativeCodecEngine, RawHandle};
pub use error::{Error, Result};
pub use format::{AudioFormat, PcmEncoding};
pub use pipeline::PipelineHandle;
pub use processors::{AudioProcessor, ProcessorState, SharedProcessor, Stage};
pub use registry::{EngineKind, EngineRegistry};
pub use stats::{RuntimeStatsHandle, StatsSummary};
