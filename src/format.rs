use std::fmt;

use serde::{Deserialize, Serialize};

/// PCM sample encodings understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PcmEncoding {
    Invalid,
    /// Signed two's-complement bytes, silence at 0x00. Unsigned offset-binary
    /// 8-bit sources must be re-biased by 0x80 before they enter the bridge.
    Pcm8,
    Pcm16,
    Pcm24,
    Pcm32,
    PcmFloat,
}

impl PcmEncoding {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            PcmEncoding::Invalid => 0,
            PcmEncoding::Pcm8 => 1,
            PcmEncoding::Pcm16 => 2,
            PcmEncoding::Pcm24 => 3,
            PcmEncoding::Pcm32 | PcmEncoding::PcmFloat => 4,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            PcmEncoding::Pcm8 | PcmEncoding::Pcm16 | PcmEncoding::Pcm24 | PcmEncoding::Pcm32
        )
    }
}

/// Sample rate, channel layout and encoding of an interleaved PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate_hz: u32,
    pub channel_count: u16,
    pub encoding: PcmEncoding,
}

impl AudioFormat {
    pub const NOT_SET: AudioFormat = AudioFormat {
        sample_rate_hz: 0,
        channel_count: 0,
        encoding: PcmEncoding::Invalid,
    };

    pub const fn new(sample_rate_hz: u32, channel_count: u16, encoding: PcmEncoding) -> Self {
        Self {
            sample_rate_hz,
            channel_count,
            encoding,
        }
    }

    pub const fn bytes_per_frame(&self) -> usize {
        self.channel_count as usize * self.encoding.bytes_per_sample()
    }

    pub fn is_set(&self) -> bool {
        *self != Self::NOT_SET
    }

    pub fn with_encoding(self, encoding: PcmEncoding) -> Self {
        Self { encoding, ..self }
    }

    pub fn with_channels(self, channel_count: u16) -> Self {
        Self {
            channel_count,
            ..self
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {}ch {:?}",
            self.sample_rate_hz, self.channel_count, self.encoding
        )
    }
}
