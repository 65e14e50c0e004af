use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::engine::NativeCodecEngine;
use crate::error::{Error, Result};

pub const MIME_MHA1: &str = "audio/mha1";
pub const MIME_MHM1: &str = "audio/mhm1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Virtualizer,
    Alc,
    Decoder,
}

/// Native engines available to this process. Built once at startup and passed
/// to the chain and decoder constructors.
#[derive(Default, Clone)]
pub struct EngineRegistry {
    engines: HashMap<EngineKind, Arc<dyn NativeCodecEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, kind: EngineKind, engine: Arc<dyn NativeCodecEngine>) -> Self {
        self.register(kind, engine);
        self
    }

    pub fn register(&mut self, kind: EngineKind, engine: Arc<dyn NativeCodecEngine>) {
        info!(?kind, engine = engine.name(), version = %engine.version(), "engine registered");
        self.engines.insert(kind, engine);
    }

    pub fn get(&self, kind: EngineKind) -> Option<Arc<dyn NativeCodecEngine>> {
        self.engines.get(&kind).cloned()
    }

    pub fn require(&self, kind: EngineKind) -> Result<Arc<dyn NativeCodecEngine>> {
        self.get(kind)
            .ok_or_else(|| Error::InitializationFailed(format!("no {kind:?} engine registered")))
    }

    pub fn is_available(&self, kind: EngineKind) -> bool {
        self.engines.contains_key(&kind)
    }

    /// Decoder codec name for a MIME type.
    pub fn codec_name(mime_type: &str) -> Option<&'static str> {
        match mime_type {
            MIME_MHA1 => Some("mpegh3d.mha1"),
            MIME_MHM1 => Some("mpegh3d.mhm1"),
            _ => None,
        }
    }

    pub fn supports_format(&self, mime_type: &str) -> bool {
        self.is_available(EngineKind::Decoder) && Self::codec_name(mime_type).is_some()
    }

    pub fn decoder_version(&self) -> Option<String> {
        self.get(EngineKind::Decoder).map(|e| e.version())
    }
}
