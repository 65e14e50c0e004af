use std::borrow::Cow;

use tracing::{debug, info};

use crate::config::ProcessingConfig;
use crate::error::{Error, Result};
use crate::format::{AudioFormat, PcmEncoding};
use crate::processors::{
    AudioProcessor, FormatConverterStage, FrameBufferingStage, NativeEngineStage, ProcessorState,
    Stage,
};
use crate::registry::{EngineKind, EngineRegistry};
use crate::stats::RuntimeStatsHandle;

/// Ordered stages; the output of one is the input of the next.
pub struct ProcessorChain {
    stages: Vec<Stage>,
    input: AudioFormat,
    output: AudioFormat,
    pending: Vec<u8>,
    ended: bool,
}

impl Default for ProcessorChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            input: AudioFormat::NOT_SET,
            output: AudioFormat::NOT_SET,
            pending: Vec::new(),
            ended: false,
        }
    }

    /// Builds the playback chain:
    /// integer to float, virtualizer, frame buffering (ALC without virtualizer), ALC, sink encoding.
    pub fn from_config(
        config: &ProcessingConfig,
        registry: &EngineRegistry,
        stats: RuntimeStatsHandle,
    ) -> Result<Self> {
        config.validate()?;
        let mut chain = Self::new();

        // Stage 1: integer PCM to float
        chain.push(Stage::FormatConverter(FormatConverterStage::to_float()));

        // Stage 2: virtualizer (if enabled)
        if config.enable_virtualizer {
            let engine = registry.require(EngineKind::Virtualizer)?;
            chain.push(Stage::NativeEngine(NativeEngineStage::virtualizer(
                engine,
                config,
                stats.clone(),
            )));
        }

        // Stage 3: ALC (if enabled), fed fixed frames when nothing upstream frames the audio
        if config.enable_alc {
            let engine = registry.require(EngineKind::Alc)?;
            if !config.enable_virtualizer {
                chain.push(Stage::FrameBuffering(FrameBufferingStage::new(
                    config.frame_size,
                    stats.clone(),
                )));
            }
            chain.push(Stage::NativeEngine(NativeEngineStage::alc(
                engine,
                config,
                stats.clone(),
            )));
        }

        // Stage 4: sink encoding
        if config.sink_encoding == PcmEncoding::Pcm16 {
            chain.push(Stage::FormatConverter(FormatConverterStage::to_int16(
                config.int16_clamp,
            )));
        }

        info!(stages = ?chain.stage_names(), "processor chain built");
        Ok(chain)
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn input_format(&self) -> AudioFormat {
        self.input
    }

    pub fn output_format(&self) -> AudioFormat {
        self.output
    }

    /// Feeds `input` through the stages from index `from` onward.
    fn pump(&mut self, from: usize, input: &[u8]) -> Result<()> {
        let mut data: Cow<'_, [u8]> = Cow::Borrowed(input);
        for stage in self.stages[from..].iter_mut() {
            if !stage.is_active() {
                continue;
            }
            stage.queue_input(&data)?;
            data = Cow::Owned(stage.get_output());
        }
        self.pending.extend_from_slice(&data);
        Ok(())
    }
}

impl AudioProcessor for ProcessorChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    /// A rejection leaves the whole chain unconfigured.
    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat> {
        let mut format = input;
        for index in 0..self.stages.len() {
            let stage = &mut self.stages[index];
            let name = stage.name();
            format = match stage.configure(format) {
                Ok(next) => next,
                Err(e) => {
                    debug!(index, stage = name, %format, error = %e, "stage rejected format");
                    self.reset();
                    return Err(Error::StageRejected {
                        index,
                        stage: name,
                        source: Box::new(e),
                    });
                }
            };
        }
        if input != self.input {
            debug!(%input, output = %format, "processor chain configured");
        }
        self.input = input;
        self.output = format;
        self.ended = false;
        Ok(format)
    }

    fn state(&self) -> ProcessorState {
        if self.output.is_set() {
            ProcessorState::Active
        } else {
            ProcessorState::Unconfigured
        }
    }

    fn queue_input(&mut self, input: &[u8]) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        self.pump(0, input)
    }

    fn get_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    fn queue_end_of_stream(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.queue_end_of_stream();
        }
        self.ended = true;
    }

    /// Terminal frames are pushed through the remaining stages in order.
    fn mark_stream_end(&mut self) -> Result<()> {
        for index in 0..self.stages.len() {
            let stage = &mut self.stages[index];
            if !stage.is_active() {
                continue;
            }
            stage.mark_stream_end()?;
            let tail = stage.get_output();
            if !tail.is_empty() {
                self.pump(index + 1, &tail)?;
            }
        }
        Ok(())
    }

    fn is_ended(&self) -> bool {
        self.ended && self.pending.is_empty() && self.stages.iter().all(|s| s.is_ended())
    }

    fn flush(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.flush();
        }
        self.pending.clear();
        self.ended = false;
    }

    fn reset(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.reset();
        }
        self.pending.clear();
        self.ended = false;
        self.input = AudioFormat::NOT_SET;
        self.output = AudioFormat::NOT_SET;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::FrameStatus;
    use crate::engine::testing::StubEngine;
    use std::sync::Arc;

    const N: usize = 1024;

    fn pcm16_surround() -> AudioFormat {
        AudioFormat::new(48_000, 14, PcmEncoding::Pcm16)
    }

    fn pcm16(samples_per_channel: usize, channels: usize, value: i16) -> Vec<u8> {
        std::iter::repeat(value.to_le_bytes())
            .take(samples_per_channel * channels)
            .flatten()
            .collect()
    }

    fn virtualizer_chain(stub: &Arc<StubEngine>, stats: RuntimeStatsHandle) -> ProcessorChain {
        let registry = EngineRegistry::new().with_engine(EngineKind::Virtualizer, stub.clone());
        ProcessorChain::from_config(&ProcessingConfig::default(), &registry, stats).unwrap()
    }

    #[test]
    fn default_config_builds_converter_and_virtualizer() {
        let stub = StubEngine::new(2);
        let chain = virtualizer_chain(&stub, RuntimeStatsHandle::new());
        assert_eq!(chain.stage_names(), vec!["format_converter", "virtualizer"]);
        assert_eq!(chain.state(), ProcessorState::Unconfigured);
    }

    #[test]
    fn missing_engine_fails_construction() {
        let err = ProcessorChain::from_config(
            &ProcessingConfig::default(),
            &EngineRegistry::new(),
            RuntimeStatsHandle::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::InitializationFailed(_)));
    }

    #[test]
    fn two_frames_from_one_int16_buffer() {
        let stub = StubEngine::new(2);
        let mut chain = virtualizer_chain(&stub, RuntimeStatsHandle::new());
        let out = chain.configure(pcm16_surround()).unwrap();
        assert_eq!(out, AudioFormat::new(48_000, 2, PcmEncoding::PcmFloat));

        chain.queue_input(&pcm16(2 * N, 14, 0x4000)).unwrap();
        let samples: Vec<f32> = bytemuck::pod_collect_to_vec(&chain.get_output());
        assert_eq!(samples.len(), 2 * N * 2);
        assert!(samples.iter().all(|&s| (s - 0.5).abs() < 1.0e-6));

        let statuses: Vec<FrameStatus> = stub.frames().iter().map(|f| f.status).collect();
        assert_eq!(statuses, vec![FrameStatus::Start, FrameStatus::Middle]);
        assert!(chain.get_output().is_empty());
    }

    #[test]
    fn short_stream_is_padded_at_codec_switch() {
        let stub = StubEngine::new(2);
        let mut chain = virtualizer_chain(&stub, RuntimeStatsHandle::new());
        chain.configure(pcm16_surround()).unwrap();

        chain.queue_input(&pcm16(500, 14, 0x4000)).unwrap();
        assert!(chain.get_output().is_empty());
        chain.mark_stream_end().unwrap();

        let frames = stub.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].status, FrameStatus::End);
        assert_eq!(frames[0].valid_samples, 500);
        assert!(frames[0].samples[500 * 14..].iter().all(|&s| s == 0.0));
        assert_eq!(chain.get_output().len(), N * 2 * 4);
    }

    #[test]
    fn identical_reconfigure_skips_native_initialization() {
        let stub = StubEngine::new(2);
        let stats = RuntimeStatsHandle::new();
        let mut chain = virtualizer_chain(&stub, stats.clone());

        chain.configure(pcm16_surround()).unwrap();
        chain.configure(pcm16_surround()).unwrap();
        chain.configure(pcm16_surround()).unwrap();

        assert_eq!(stub.counts().initialize(), 1);
        assert_eq!(stats.snapshot().reconfigure_skips, 2);
    }

    #[test]
    fn rejection_names_the_stage() {
        let stub = StubEngine::new(2);
        stub.fail_initialize(true);
        let mut chain = virtualizer_chain(&stub, RuntimeStatsHandle::new());
        let err = chain.configure(pcm16_surround()).unwrap_err();
        match &err {
            Error::StageRejected { index, stage, source } => {
                assert_eq!(*index, 1);
                assert_eq!(*stage, "virtualizer");
                assert!(matches!(**source, Error::InitializationFailed(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_fatal());

        let err = chain.configure(AudioFormat::NOT_SET).unwrap_err();
        assert!(matches!(err, Error::StageRejected { index: 0, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn failed_reconfigure_leaves_chain_unconfigured() {
        let stub = StubEngine::new(2);
        let mut chain = virtualizer_chain(&stub, RuntimeStatsHandle::new());
        chain.configure(AudioFormat::new(48_000, 14, PcmEncoding::PcmFloat)).unwrap();

        stub.fail_initialize(true);
        let float_44k = AudioFormat::new(44_100, 14, PcmEncoding::PcmFloat);
        assert!(chain.configure(float_44k).is_err());
        assert_eq!(chain.state(), ProcessorState::Unconfigured);
        assert_eq!(chain.output_format(), AudioFormat::NOT_SET);
        assert_eq!(stub.counts().release(), 1);

        let input = bytemuck::cast_slice::<f32, u8>(&vec![0.5f32; N * 14]).to_vec();
        chain.queue_input(&input).unwrap();
        chain.mark_stream_end().unwrap();
        assert!(chain.get_output().is_empty());

        stub.fail_initialize(false);
        assert_eq!(chain.configure(float_44k).unwrap().channel_count, 2);
    }

    #[test]
    fn alc_only_chain_frames_its_input() {
        let alc = StubEngine::new(2);
        alc.set_gain(2.0);
        let registry = EngineRegistry::new().with_engine(EngineKind::Alc, alc.clone());
        let config = ProcessingConfig {
            enable_virtualizer: false,
            enable_alc: true,
            ..ProcessingConfig::default()
        };
        let mut chain =
            ProcessorChain::from_config(&config, &registry, RuntimeStatsHandle::new()).unwrap();
        assert_eq!(
            chain.stage_names(),
            vec!["format_converter", "frame_buffering", "alc"]
        );

        let stereo = AudioFormat::new(48_000, 2, PcmEncoding::PcmFloat);
        assert_eq!(chain.configure(stereo).unwrap(), stereo);
        let input: Vec<u8> = bytemuck::cast_slice::<f32, u8>(&vec![0.25f32; 1500 * 2]).to_vec();
        chain.queue_input(&input).unwrap();
        let out: Vec<f32> = bytemuck::pod_collect_to_vec(&chain.get_output());
        assert_eq!(out.len(), N * 2);
        assert!(out.iter().all(|&s| s == 0.5));

        chain.mark_stream_end().unwrap();
        let tail: Vec<f32> = bytemuck::pod_collect_to_vec(&chain.get_output());
        assert_eq!(tail.len(), N * 2);
        assert_eq!(tail[(1500 - N) * 2 - 1], 0.5);
        assert_eq!(tail[(1500 - N) * 2], 0.0);
    }

    #[test]
    fn int16_sink_encoding() {
        let stub = StubEngine::new(2);
        let registry = EngineRegistry::new().with_engine(EngineKind::Virtualizer, stub.clone());
        let config = ProcessingConfig {
            sink_encoding: PcmEncoding::Pcm16,
            ..ProcessingConfig::default()
        };
        let mut chain =
            ProcessorChain::from_config(&config, &registry, RuntimeStatsHandle::new()).unwrap();
        let out = chain.configure(pcm16_surround()).unwrap();
        assert_eq!(out, AudioFormat::new(48_000, 2, PcmEncoding::Pcm16));

        chain.queue_input(&pcm16(N, 14, i16::MIN)).unwrap();
        let bytes = chain.get_output();
        assert_eq!(bytes.len(), N * 2 * 2);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MIN);
    }

    #[test]
    fn flush_and_reset_reach_every_stage() {
        let stub = StubEngine::new(2);
        let mut chain = virtualizer_chain(&stub, RuntimeStatsHandle::new());
        chain.configure(pcm16_surround()).unwrap();
        chain.queue_input(&pcm16(N / 2, 14, 1)).unwrap();

        chain.flush();
        assert_eq!(stub.counts().reset(), 1);
        chain.queue_input(&pcm16(N / 2, 14, 1)).unwrap();
        assert!(chain.get_output().is_empty());

        chain.queue_end_of_stream();
        assert!(chain.is_ended());

        chain.reset();
        chain.reset();
        assert_eq!(stub.counts().release(), 1);
        assert_eq!(chain.state(), ProcessorState::Unconfigured);
        chain.queue_input(&pcm16(N, 14, 1)).unwrap();
        assert!(chain.get_output().is_empty());
    }
}
