use crate::format::{AudioFormat, PcmEncoding};

const FLOAT_BYTES: usize = std::mem::size_of::<f32>();

/// Position of a frame within a stream, as reported to the native engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Middle,
    Start,
    End,
}

impl FrameStatus {
    /// Status tag value of the engine ABI.
    pub const fn native_value(self) -> i32 {
        match self {
            FrameStatus::Middle => 0,
            FrameStatus::Start => 1,
            FrameStatus::End => 2,
        }
    }
}

/// A full frame ready for the engine. Borrowed from the accumulator until [`FrameAccumulator::clear`].
#[derive(Debug)]
pub struct PreparedFrame<'a> {
    pub samples: &'a [f32],
    pub silence_flags: &'a mut [bool],
    pub status: FrameStatus,
    /// Samples per channel that carry real audio; the rest is padding.
    pub valid_samples: usize,
}

impl PreparedFrame<'_> {
    pub fn is_padded(&self) -> bool {
        self.valid_samples * self.silence_flags.len().max(1) < self.samples.len()
    }
}

/// Reshapes arbitrarily sized float PCM chunks into frames of exactly
/// `frame_size` samples per channel.
pub struct FrameAccumulator {
    frame_size: usize,
    format: AudioFormat,
    samples: Vec<f32>,
    filled: usize,
    silence_flags: Vec<bool>,
    is_first_sample: bool,
    is_last_data: bool,
}

impl FrameAccumulator {
    pub fn new(frame_size: usize, format: AudioFormat) -> Self {
        let mut acc = Self {
            frame_size,
            format: AudioFormat::NOT_SET,
            samples: Vec::new(),
            filled: 0,
            silence_flags: Vec::new(),
            is_first_sample: true,
            is_last_data: false,
        };
        acc.set_format(format);
        acc
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Re-dimensions the buffer for `format`. An identical format keeps buffered data.
    pub fn set_format(&mut self, format: AudioFormat) {
        debug_assert!(
            format.encoding == PcmEncoding::PcmFloat || !format.is_set(),
            "frames are float only"
        );
        if format == self.format {
            return;
        }
        self.format = format;
        let channels = format.channel_count as usize;
        self.samples = vec![0.0; self.frame_size * channels];
        self.silence_flags = vec![false; channels];
        self.clear();
    }

    fn capacity_bytes(&self) -> usize {
        self.samples.len() * FLOAT_BYTES
    }

    pub fn remaining_bytes(&self) -> usize {
        self.capacity_bytes() - self.filled
    }

    pub fn filled_bytes(&self) -> usize {
        self.filled
    }

    /// Copies as much of `chunk` as fits and returns the number of bytes taken.
    pub fn append(&mut self, chunk: &[u8]) -> usize {
        let n = chunk.len().min(self.remaining_bytes());
        if n == 0 {
            return 0;
        }
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.samples);
        bytes[self.filled..self.filled + n].copy_from_slice(&chunk[..n]);
        self.filled += n;
        n
    }

    pub fn is_full(&self) -> bool {
        self.remaining_bytes() == 0
    }

    pub fn is_ready_to_process(&self) -> bool {
        self.is_last_data || self.is_full()
    }

    /// Terminal signal for the current stream, e.g. before a codec switch.
    pub fn mark_stream_end(&mut self) {
        self.is_last_data = true;
    }

    pub fn is_stream_end_pending(&self) -> bool {
        self.is_last_data
    }

    /// Tags the buffered frame and pads a terminal partial frame with silence.
    ///
    /// Call only when [`is_ready_to_process`](Self::is_ready_to_process) holds.
    /// The frame stays readable until [`clear`](Self::clear).
    pub fn prepare_frame(&mut self) -> PreparedFrame<'_> {
        let mut valid_samples = self.frame_size;
        let mut status = FrameStatus::Middle;
        if self.is_last_data {
            status = FrameStatus::End;
            self.is_last_data = false;
            self.is_first_sample = true;
            if !self.is_full() {
                let bytes_per_frame = self.format.bytes_per_frame().max(1);
                valid_samples = self.filled / bytes_per_frame;
                // An incomplete trailing sample frame is padding too
                let pad_from = valid_samples * self.format.channel_count as usize;
                self.samples[pad_from..].fill(0.0);
                self.filled = self.capacity_bytes();
            }
        } else if self.is_first_sample {
            status = FrameStatus::Start;
            self.is_first_sample = false;
        }
        PreparedFrame {
            samples: &self.samples,
            silence_flags: &mut self.silence_flags,
            status,
            valid_samples,
        }
    }

    /// Empties the frame slot for reuse. Boundary flags are kept.
    pub fn clear(&mut self) {
        self.filled = 0;
        self.silence_flags.fill(false);
    }

    /// Clears the slot and re-arms the start-of-stream tag.
    pub fn reset_boundaries(&mut self) {
        self.clear();
        self.is_first_sample = true;
        self.is_last_data = false;
    }
}
