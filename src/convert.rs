//! Integer PCM <-> 32-bit float sample conversion.
//!
//! Integer samples are left-justified into a 32-bit two's-complement word and
//! scaled by `1 / 0x7FFFFFFF`, which is what the native engines expect.

use dasp::Sample;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::format::PcmEncoding;

const PCM32_TO_FLOAT: f64 = 1.0 / 0x7FFF_FFFF as f64;

/// Upper clamp bound used when narrowing float to 16-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Int16Clamp {
    /// `[-32768, 32767]`
    #[default]
    Symmetric,
    /// `[-32768, 0x7999]`, bit-compatible with older decoder output.
    Legacy,
}

impl Int16Clamp {
    fn max(self) -> f32 {
        match self {
            Int16Clamp::Symmetric => 32767.0,
            Int16Clamp::Legacy => 31129.0, // 0x7999
        }
    }
}

/// Converts one signed integer sample of `encoding` width to float.
///
/// `sample` holds the native-width value, e.g. `-32768..=32767` for `Pcm16`.
pub fn to_float(sample: i32, encoding: PcmEncoding) -> f32 {
    let shift = match encoding {
        PcmEncoding::Pcm8 => 24,
        PcmEncoding::Pcm16 => 16,
        PcmEncoding::Pcm24 => 8,
        PcmEncoding::Pcm32 => 0,
        PcmEncoding::PcmFloat | PcmEncoding::Invalid => return f32::EQUILIBRIUM,
    };
    left_justified_to_float(((sample as u32) << shift) as i32)
}

fn left_justified_to_float(word: i32) -> f32 {
    let value = (PCM32_TO_FLOAT * word as f64) as f32;
    if value.is_nan() {
        f32::EQUILIBRIUM
    } else {
        value
    }
}

/// Round half up, matching the engine reference output.
fn round_scaled(sample: f32, scale: f32) -> f32 {
    (sample * scale + 0.5).floor()
}

pub fn to_int16(sample: f32, clamp: Int16Clamp) -> i16 {
    let scaled = round_scaled(sample, 32768.0);
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(-32768.0, clamp.max()) as i16
}

pub fn to_int8(sample: f32) -> i8 {
    let scaled = round_scaled(sample, 128.0);
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(-128.0, 127.0) as i8
}

/// Unpacks one little-endian sample into a left-justified 32-bit word.
fn unpack_le(bytes: &[u8], encoding: PcmEncoding) -> i32 {
    let word = match encoding {
        PcmEncoding::Pcm8 => (bytes[0] as u32) << 24,
        PcmEncoding::Pcm16 => ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 24),
        PcmEncoding::Pcm24 => {
            ((bytes[0] as u32) << 8) | ((bytes[1] as u32) << 16) | ((bytes[2] as u32) << 24)
        }
        PcmEncoding::Pcm32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        PcmEncoding::PcmFloat | PcmEncoding::Invalid => 0,
    };
    word as i32
}

/// Decodes a PCM byte buffer into float samples. A trailing partial sample is dropped.
pub fn pcm_to_float(input: &[u8], encoding: PcmEncoding) -> Vec<f32> {
    let width = encoding.bytes_per_sample();
    if width == 0 {
        return Vec::new();
    }
    let whole = input.len() - input.len() % width;
    if whole != input.len() {
        trace!(dropped = input.len() - whole, "partial trailing sample");
    }
    let input = &input[..whole];
    if encoding == PcmEncoding::PcmFloat {
        return bytemuck::pod_collect_to_vec::<u8, f32>(input)
            .into_iter()
            .map(|s| if s.is_nan() { f32::EQUILIBRIUM } else { s })
            .collect();
    }
    input
        .chunks_exact(width)
        .map(|chunk| left_justified_to_float(unpack_le(chunk, encoding)))
        .collect()
}

/// Encodes float samples as `encoding` bytes. Only float, 16-bit and 8-bit targets are produced.
pub fn float_to_pcm(samples: &[f32], encoding: PcmEncoding, clamp: Int16Clamp) -> Option<Vec<u8>> {
    match encoding {
        PcmEncoding::PcmFloat => Some(bytemuck::cast_slice::<f32, u8>(samples).to_vec()),
        PcmEncoding::Pcm16 => Some(
            samples
                .iter()
                .flat_map(|&s| to_int16(s, clamp).to_le_bytes())
                .collect(),
        ),
        PcmEncoding::Pcm8 => Some(samples.iter().map(|&s| to_int8(s) as u8).collect()),
        _ => None,
    }
}
