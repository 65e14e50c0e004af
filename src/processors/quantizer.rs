use tracing::debug;

use super::{AudioProcessor, ProcessorState};
use crate::accumulator::FrameAccumulator;
use crate::error::{Error, Result};
use crate::format::{AudioFormat, PcmEncoding};
use crate::stats::RuntimeStatsHandle;

/// Frame buffering - converts variable-size float chunks to fixed frames of
/// `frame_size` samples per channel. The terminal partial frame of a stream is
/// zero-padded on [`mark_stream_end`](AudioProcessor::mark_stream_end).
pub struct FrameBufferingStage {
    accumulator: FrameAccumulator,
    format: AudioFormat,
    state: ProcessorState,
    ready: Vec<u8>,
    ended: bool,
    stats: RuntimeStatsHandle,
}

impl FrameBufferingStage {
    pub fn new(frame_size: usize, stats: RuntimeStatsHandle) -> Self {
        Self {
            accumulator: FrameAccumulator::new(frame_size, AudioFormat::NOT_SET),
            format: AudioFormat::NOT_SET,
            state: ProcessorState::Unconfigured,
            ready: Vec::new(),
            ended: false,
            stats,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.accumulator.frame_size()
    }

    fn emit_frame(&mut self) {
        let frame = self.accumulator.prepare_frame();
        let (status, padded) = (frame.status, frame.is_padded());
        self.ready
            .extend_from_slice(bytemuck::cast_slice::<f32, u8>(frame.samples));
        self.accumulator.clear();
        self.stats.update(|s| s.record_frame(status, padded));
    }
}

impl AudioProcessor for FrameBufferingStage {
    fn name(&self) -> &'static str {
        "frame_buffering"
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat> {
        if input.encoding != PcmEncoding::PcmFloat || input.channel_count == 0 {
            return Err(Error::UnsupportedFormat(input));
        }
        if input == self.format && self.state != ProcessorState::Unconfigured {
            return Ok(input);
        }
        debug!(%input, frame_size = self.frame_size(), "frame buffering configured");
        self.accumulator.set_format(input);
        self.accumulator.reset_boundaries();
        self.format = input;
        self.ready.clear();
        self.ended = false;
        self.state = ProcessorState::Active;
        Ok(input)
    }

    fn state(&self) -> ProcessorState {
        self.state
    }

    fn queue_input(&mut self, input: &[u8]) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let mut rest = input;
        while !rest.is_empty() {
            let taken = self.accumulator.append(rest);
            rest = &rest[taken..];
            if self.accumulator.is_full() {
                self.emit_frame();
            }
        }
        Ok(())
    }

    fn get_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.ready)
    }

    fn queue_end_of_stream(&mut self) {
        self.ended = true;
    }

    fn mark_stream_end(&mut self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        self.accumulator.mark_stream_end();
        self.emit_frame();
        Ok(())
    }

    fn is_ended(&self) -> bool {
        self.ended && self.ready.is_empty()
    }

    fn flush(&mut self) {
        self.accumulator.reset_boundaries();
        self.ready.clear();
        self.ended = false;
        if self.state == ProcessorState::Active {
            self.state = ProcessorState::Flushed;
        }
    }

    fn reset(&mut self) {
        self.flush();
        self.format = AudioFormat::NOT_SET;
        self.state = ProcessorState::Unconfigured;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono() -> AudioFormat {
        AudioFormat::new(48_000, 1, PcmEncoding::PcmFloat)
    }

    fn floats(n: usize, value: f32) -> Vec<u8> {
        bytemuck::cast_slice::<f32, u8>(&vec![value; n]).to_vec()
    }

    #[test]
    fn rejects_integer_input() {
        let mut q = FrameBufferingStage::new(8, RuntimeStatsHandle::new());
        let err = q
            .configure(AudioFormat::new(48_000, 1, PcmEncoding::Pcm16))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn emits_only_full_frames() {
        let stats = RuntimeStatsHandle::new();
        let mut q = FrameBufferingStage::new(8, stats.clone());
        q.configure(mono()).unwrap();

        q.queue_input(&floats(5, 1.0)).unwrap();
        assert!(q.get_output().is_empty());
        q.queue_input(&floats(13, 1.0)).unwrap();
        let out = q.get_output();
        assert_eq!(out.len(), 2 * 8 * 4);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_start, 1);
        assert_eq!(snap.frames_middle, 1);
    }

    #[test]
    fn stream_end_outputs_padded_tail() {
        let stats = RuntimeStatsHandle::new();
        let mut q = FrameBufferingStage::new(8, stats.clone());
        q.configure(mono()).unwrap();
        q.queue_input(&floats(3, 1.0)).unwrap();
        q.mark_stream_end().unwrap();

        let samples: Vec<f32> = bytemuck::pod_collect_to_vec(&q.get_output());
        assert_eq!(samples.len(), 8);
        assert_eq!(samples[0], 1.0);
        assert_eq!(samples[2], 1.0);
        assert_eq!(samples[3], 0.0);
        assert_eq!(samples[7], 0.0);
        assert_eq!(stats.snapshot().padded_frames, 1);
        assert_eq!(stats.snapshot().frames_end, 1);
    }

    #[test]
    fn flush_drops_partial_frame() {
        let mut q = FrameBufferingStage::new(8, RuntimeStatsHandle::new());
        q.configure(mono()).unwrap();
        q.queue_input(&floats(6, 1.0)).unwrap();
        q.flush();
        assert_eq!(q.state(), ProcessorState::Flushed);
        q.queue_input(&floats(6, 1.0)).unwrap();
        assert!(q.get_output().is_empty());
        q.queue_input(&floats(2, 1.0)).unwrap();
        assert_eq!(q.get_output().len(), 32);
    }
}
