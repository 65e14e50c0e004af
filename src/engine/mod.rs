//! Binary contract of the opaque native codec/DSP engines and an owning
//! session wrapper around their handles.

use std::sync::Arc;

use tracing::{debug, error};

use crate::accumulator::FrameStatus;
use crate::config::CoefficientPaths;
use crate::error::{Error, Result};

#[cfg(test)]
pub(crate) mod testing;
#[cfg(feature = "webrtc")]
pub mod webrtc;

/// Opaque engine handle; zero is the null handle.
pub type RawHandle = u64;

pub const NULL_HANDLE: RawHandle = 0;

/// `process` result: the unit was malformed, the session may continue.
pub const RESULT_INVALID_DATA: i32 = -1;
/// `process` result: unrecoverable engine failure.
pub const RESULT_ERROR_OTHER: i32 = -2;

/// Parameters handed to `initialize` and again to `reset`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineInit {
    pub sample_rate_hz: u32,
    pub channel_count: u16,
    pub frame_size: usize,
    pub codec: Option<String>,
    pub extra_data: Option<Vec<u8>>,
    pub coefficients: Option<CoefficientPaths>,
}

/// Input of a single `process` call.
#[derive(Debug)]
pub enum EngineInput<'a> {
    /// One fixed-size interleaved float frame.
    Frame {
        samples: &'a [f32],
        status: FrameStatus,
        valid_samples: usize,
        silence_flags: &'a mut [bool],
    },
    /// An arbitrary run of interleaved float samples, processed without framing.
    Block { samples: &'a [f32] },
    /// One compressed access unit.
    Compressed { data: &'a [u8] },
}

/// The stable native contract.
///
/// `process` writes interleaved float samples to `output` and returns how many
/// it wrote, [`RESULT_INVALID_DATA`], or another negative error code.
/// `channel_count`/`sample_rate` are meaningful only after a successful `process`.
pub trait NativeCodecEngine: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> String;
    fn initialize(&self, init: &EngineInit) -> RawHandle;
    fn process(&self, handle: RawHandle, input: EngineInput<'_>, output: &mut [f32]) -> i32;
    /// Returns the handle to continue with, or [`NULL_HANDLE`] if the engine could not recover.
    fn reset(&self, handle: RawHandle, init: &EngineInit) -> RawHandle;
    fn release(&self, handle: RawHandle);
    fn channel_count(&self, handle: RawHandle) -> i32;
    fn sample_rate(&self, handle: RawHandle) -> i32;
}

/// Owns one native handle; the handle is released when the session drops.
pub struct EngineSession {
    engine: Arc<dyn NativeCodecEngine>,
    handle: RawHandle,
    init: EngineInit,
}

impl EngineSession {
    pub fn open(engine: Arc<dyn NativeCodecEngine>, init: EngineInit) -> Result<Self> {
        let handle = engine.initialize(&init);
        if handle == NULL_HANDLE {
            error!(engine = engine.name(), "native initialize returned a null handle");
            return Err(Error::InitializationFailed(format!(
                "{} returned a null handle",
                engine.name()
            )));
        }
        debug!(engine = engine.name(), handle, "native session opened");
        Ok(Self {
            engine,
            handle,
            init,
        })
    }

    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    pub fn init(&self) -> &EngineInit {
        &self.init
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn is_valid(&self) -> bool {
        self.handle != NULL_HANDLE
    }

    pub fn process(&mut self, input: EngineInput<'_>, output: &mut [f32]) -> i32 {
        if !self.is_valid() {
            return RESULT_ERROR_OTHER;
        }
        self.engine.process(self.handle, input, output)
    }

    /// Resets the native state with the original init parameters.
    ///
    /// On failure the session holds the null handle and must be discarded.
    pub fn reset(&mut self) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::InitializationFailed("session has no handle".into()));
        }
        let handle = self.engine.reset(self.handle, &self.init);
        self.handle = handle;
        if handle == NULL_HANDLE {
            error!(engine = self.engine.name(), "native reset returned a null handle");
            return Err(Error::InitializationFailed(format!(
                "{} reset returned a null handle",
                self.engine.name()
            )));
        }
        debug!(engine = self.engine.name(), handle, "native session reset");
        Ok(())
    }

    pub fn channel_count(&self) -> Option<u16> {
        if !self.is_valid() {
            return None;
        }
        u16::try_from(self.engine.channel_count(self.handle))
            .ok()
            .filter(|&c| c > 0)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        if !self.is_valid() {
            return None;
        }
        u32::try_from(self.engine.sample_rate(self.handle))
            .ok()
            .filter(|&r| r > 0)
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if self.handle != NULL_HANDLE {
            self.engine.release(self.handle);
            debug!(engine = self.engine.name(), handle = self.handle, "native session released");
            self.handle = NULL_HANDLE;
        }
    }
}
