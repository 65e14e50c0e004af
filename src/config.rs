use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::convert::Int16Clamp;
use crate::error::{Error, Result};
use crate::format::PcmEncoding;

pub const DEFAULT_FRAME_SIZE: usize = 1024;
pub const DEFAULT_COEF_DIR: &str = "files/com.sony.immersive-audio/coef/";
pub const DEFAULT_HRTF_CONFIG: &str = "com.sony.360ra.hrtf13.config";
pub const DEFAULT_CP_CONFIG: &str = "com.sony.360ra.cp.config";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Samples per channel in every frame handed to a framed engine.
    pub frame_size: usize,
    /// Application-private root directory the coefficient paths hang off.
    pub app_root: PathBuf,
    pub coef_dir: String,
    pub hrtf_config: String,
    pub cp_config: String,
    pub enable_virtualizer: bool,
    pub enable_alc: bool,
    pub virtualizer_output_channels: u16,
    pub decoder_output_encoding: PcmEncoding,
    /// Encoding handed to the playback sink at the end of the chain.
    pub sink_encoding: PcmEncoding,
    pub int16_clamp: Int16Clamp,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            app_root: PathBuf::new(),
            coef_dir: DEFAULT_COEF_DIR.to_string(),
            hrtf_config: DEFAULT_HRTF_CONFIG.to_string(),
            cp_config: DEFAULT_CP_CONFIG.to_string(),
            enable_virtualizer: true,
            enable_alc: false,
            virtualizer_output_channels: 2,
            decoder_output_encoding: PcmEncoding::PcmFloat,
            sink_encoding: PcmEncoding::PcmFloat,
            int16_clamp: Int16Clamp::Symmetric,
        }
    }
}

impl ProcessingConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading processing config");
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 {
            return Err(Error::Config("frame_size must be non-zero".into()));
        }
        if self.virtualizer_output_channels == 0 {
            return Err(Error::Config(
                "virtualizer_output_channels must be non-zero".into(),
            ));
        }
        if !matches!(
            self.sink_encoding,
            PcmEncoding::PcmFloat | PcmEncoding::Pcm16
        ) {
            return Err(Error::Config(format!(
                "sink encoding {:?} is not supported",
                self.sink_encoding
            )));
        }
        match self.decoder_output_encoding {
            PcmEncoding::PcmFloat | PcmEncoding::Pcm16 | PcmEncoding::Pcm8 => Ok(()),
            other => Err(Error::Config(format!(
                "decoder output encoding {other:?} is not supported"
            ))),
        }
    }

    pub fn coefficient_paths(&self) -> CoefficientPaths {
        CoefficientPaths {
            app_root: self.app_root.clone(),
            relative_dir: self.coef_dir.clone(),
            hrtf_file: self.hrtf_config.clone(),
            cp_file: self.cp_config.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoefType {
    Hrtf,
    Cp,
}

/// Locations of the coefficient config files consumed by the native engines.
/// The engine owns the file contents; this layer only resolves paths.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientPaths {
    pub app_root: PathBuf,
    pub relative_dir: String,
    pub hrtf_file: String,
    pub cp_file: String,
}

impl CoefficientPaths {
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        ProcessingConfig {
            app_root: app_root.into(),
            ..ProcessingConfig::default()
        }
        .coefficient_paths()
    }

    pub fn config_file_name(&self, coef: CoefType) -> &str {
        match coef {
            CoefType::Hrtf => &self.hrtf_file,
            CoefType::Cp => &self.cp_file,
        }
    }

    /// Path relative to the app root, as passed to the engine.
    pub fn relative_config_path(&self, coef: CoefType) -> String {
        format!("{}{}", self.relative_dir, self.config_file_name(coef))
    }

    pub fn absolute_config_path(&self, coef: CoefType) -> PathBuf {
        self.app_root.join(self.relative_config_path(coef))
    }

    pub fn config_exists(&self, coef: CoefType) -> bool {
        self.absolute_config_path(coef).exists()
    }

    /// A config file holds a single line: the coefficient file path relative to the app root.
    pub fn read_relative_coef_path(&self, coef: CoefType) -> Result<String> {
        let path = self.absolute_config_path(coef);
        let text = fs::read_to_string(&path)?;
        let line = text.lines().next().unwrap_or_default().trim().to_string();
        if line.is_empty() {
            return Err(Error::Config(format!("{} is empty", path.display())));
        }
        debug!(path = %path.display(), coef = %line, "resolved coefficient file");
        Ok(line)
    }

    pub fn read_absolute_coef_path(&self, coef: CoefType) -> Result<PathBuf> {
        Ok(self.app_root.join(self.read_relative_coef_path(coef)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = ProcessingConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.frame_size, 1024);
        assert_eq!(c.int16_clamp, Int16Clamp::Symmetric);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let c = ProcessingConfig::from_toml_str(
            r#"
            frame_size = 512
            app_root = "/data/app"
            decoder_output_encoding = "pcm16"
            int16_clamp = "legacy"
            "#,
        )
        .unwrap();
        assert_eq!(c.frame_size, 512);
        assert_eq!(c.app_root, PathBuf::from("/data/app"));
        assert_eq!(c.decoder_output_encoding, PcmEncoding::Pcm16);
        assert_eq!(c.int16_clamp, Int16Clamp::Legacy);
        assert!(c.enable_virtualizer);
    }

    #[test]
    fn rejects_zero_frame_size_and_integer_24_output() {
        assert!(ProcessingConfig::from_toml_str("frame_size = 0").is_err());
        assert!(
            ProcessingConfig::from_toml_str("decoder_output_encoding = \"pcm24\"").is_err()
        );
        assert!(ProcessingConfig::from_toml_str("sink_encoding = \"pcm8\"").is_err());
    }

    #[test]
    fn coefficient_paths_resolve_under_root() {
        let paths = CoefficientPaths::new("/data/user/0/app");
        assert_eq!(
            paths.relative_config_path(CoefType::Hrtf),
            "files/com.sony.immersive-audio/coef/com.sony.360ra.hrtf13.config"
        );
        assert_eq!(
            paths.absolute_config_path(CoefType::Cp),
            PathBuf::from("/data/user/0/app/files/com.sony.immersive-audio/coef/com.sony.360ra.cp.config")
        );
    }

    #[test]
    fn reads_coefficient_path_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CoefficientPaths::new(dir.path());
        let cfg = paths.absolute_config_path(CoefType::Hrtf);
        fs::create_dir_all(cfg.parent().unwrap()).unwrap();
        fs::write(&cfg, "coef/hrtf_v2.bin\n").unwrap();

        assert!(paths.config_exists(CoefType::Hrtf));
        assert!(!paths.config_exists(CoefType::Cp));
        assert_eq!(paths.read_relative_coef_path(CoefType::Hrtf).unwrap(), "coef/hrtf_v2.bin");
        assert_eq!(
            paths.read_absolute_coef_path(CoefType::Hrtf).unwrap(),
            dir.path().join("coef/hrtf_v2.bin")
        );
        assert!(paths.read_relative_coef_path(CoefType::Cp).is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bridge.toml");
        fs::write(&file, "enable_alc = true\nvirtualizer_output_channels = 4\n").unwrap();
        let c = ProcessingConfig::load(&file).unwrap();
        assert!(c.enable_alc);
        assert_eq!(c.virtualizer_output_channels, 4);
    }
}
