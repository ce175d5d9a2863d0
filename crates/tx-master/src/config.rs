//! Engine configuration: embedded defaults merged with an optional user file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tx_engine::EngineSettings;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    engine: EngineSection,
    #[serde(default)]
    scope: ScopeSection,
    #[serde(default)]
    device: DeviceSection,
}

#[derive(Deserialize, Default)]
struct EngineSection {
    sample_rate: Option<u32>,
    fragment: Option<usize>,
    amplification: Option<f32>,
    mixer: Option<String>,
    ui_update_hz: Option<u32>,
}

#[derive(Deserialize, Default)]
struct ScopeSection {
    enabled: Option<bool>,
    seconds: Option<f64>,
}

#[derive(Deserialize, Default)]
struct DeviceSection {
    kind: Option<String>,
}

/// Resolved engine configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Frames per device request.
    pub fragment: usize,
    pub amplification: f32,
    pub mixer: String,
    pub ui_update_hz: u32,
    pub scopes: bool,
    pub scope_seconds: f64,
    pub device: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            fragment: 1024,
            amplification: 1.0,
            mixer: "integer".into(),
            ui_update_hz: 50,
            scopes: true,
            scope_seconds: 1.0,
            device: "cpal".into(),
        }
    }
}

impl EngineConfig {
    /// Embedded defaults, overridden by `user` if it exists and parses.
    ///
    /// A user file that cannot be read or parsed is logged and ignored.
    pub fn load(user: Option<&Path>) -> Self {
        let mut config = Self::default();
        match toml::from_str::<ConfigFile>(DEFAULT_CONFIG) {
            Ok(base) => config.merge(base),
            Err(e) => log::error!(target: "config", "embedded config.toml is malformed: {}", e),
        }

        if let Some(path) = user {
            match Self::read_file(path) {
                Ok(file) => {
                    let mut merged = config.clone();
                    merged.merge(file);
                    match merged.validate() {
                        Ok(()) => config = merged,
                        Err(e) => log::warn!(target: "config", "ignoring {}: {}", path.display(), e),
                    }
                }
                Err(e) => log::warn!(target: "config", "ignoring {}: {}", path.display(), e),
            }
        }
        config
    }

    /// Strictly parse a TOML document over the defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::load(None);
        config.merge(toml::from_str(text)?);
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    fn merge(&mut self, file: ConfigFile) {
        let ConfigFile { engine, scope, device } = file;
        if let Some(v) = engine.sample_rate {
            self.sample_rate = v;
        }
        if let Some(v) = engine.fragment {
            self.fragment = v;
        }
        if let Some(v) = engine.amplification {
            self.amplification = v;
        }
        if let Some(v) = engine.mixer {
            self.mixer = v;
        }
        if let Some(v) = engine.ui_update_hz {
            self.ui_update_hz = v;
        }
        if let Some(v) = scope.enabled {
            self.scopes = v;
        }
        if let Some(v) = scope.seconds {
            self.scope_seconds = v;
        }
        if let Some(v) = device.kind {
            self.device = v;
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.fragment == 0 {
            return Err(ConfigError::Invalid("fragment must be positive".into()));
        }
        if self.ui_update_hz == 0 {
            return Err(ConfigError::Invalid("ui_update_hz must be positive".into()));
        }
        if self.scope_seconds.is_nan() || self.scope_seconds < 0.0 {
            return Err(ConfigError::Invalid("scope seconds must not be negative".into()));
        }
        Ok(())
    }

    /// The subset of the configuration the engine itself reads.
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            amplification: self.amplification,
            scopes: self.scopes,
            scope_seconds: self.scope_seconds,
            ui_update_hz: self.ui_update_hz,
        }
    }
}
