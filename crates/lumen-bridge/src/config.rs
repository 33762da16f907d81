//! Configuration for the bridge.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// wasmtime engine and store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum linear memory in bytes (default = 256MB)
    pub max_memory: usize,

    /// Enable fuel-based execution limiting
    pub fuel_limit: Option<u64>,

    /// Cranelift optimization level (0-3)
    pub optimization_level: u8,

    /// Enable SIMD support
    pub enable_simd: bool,

    /// Define imports the bridge does not provide as trapping stubs
    pub trap_unknown_imports: bool,

    /// End the run loop when a frame function returns false
    pub stop_on_false_frame: bool,

    /// wasmtime cache configuration file
    pub cache_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_memory: 256 * 1024 * 1024, // 256 MB
            fuel_limit: None,
            optimization_level: 2,
            enable_simd: true,
            trap_unknown_imports: true,
            stop_on_false_frame: false,
            cache_path: None,
        }
    }
}

/// Audio pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Buffers are dropped while the schedule runs this far ahead of the device
    pub max_lead_ms: u32,

    /// Lead re-established after the queue starves
    pub underrun_cushion_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_lead_ms: 200,
            underrun_cushion_ms: 70,
        }
    }
}

impl AudioConfig {
    /// Maximum lead in seconds.
    pub fn max_lead(&self) -> f64 {
        f64::from(self.max_lead_ms) / 1000.0
    }

    /// Underrun cushion in seconds.
    pub fn underrun_cushion(&self) -> f64 {
        f64::from(self.underrun_cushion_ms) / 1000.0
    }
}

/// Host window / surface settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Initial window title
    pub title: String,

    /// Drawable width in pixels
    pub width: u32,

    /// Drawable height in pixels
    pub height: u32,

    /// Reported device pixel ratio
    pub pixel_ratio: f32,

    /// Frame callback rate in Hz
    pub refresh_rate: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "lumen".to_string(),
            width: 1280,
            height: 720,
            pixel_ratio: 1.0,
            refresh_rate: 60,
        }
    }
}

impl WindowConfig {
    /// Time between frame callbacks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_rate.max(1)))
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Engine and store settings
    pub runtime: RuntimeConfig,

    /// Audio pacing
    pub audio: AudioConfig,

    /// Window / surface
    pub window: WindowConfig,
}

impl BridgeConfig {
    /// Config for running without a display: small surface, bounded memory.
    pub fn headless() -> Self {
        Self {
            runtime: RuntimeConfig {
                max_memory: 64 * 1024 * 1024, // 64 MB
                ..Default::default()
            },
            window: WindowConfig {
                width: 640,
                height: 480,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Config for development/debugging
    pub fn development() -> Self {
        Self {
            runtime: RuntimeConfig {
                optimization_level: 0, // Faster compilation
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the bridge cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.optimization_level > 3 {
            return Err(BridgeError::Config(format!(
                "optimization_level must be 0-3, got {}",
                self.runtime.optimization_level
            )));
        }
        if self.window.refresh_rate == 0 {
            return Err(BridgeError::Config("refresh_rate must be non-zero".to_string()));
        }
        if self.audio.underrun_cushion_ms > self.audio.max_lead_ms {
            return Err(BridgeError::Config(format!(
                "underrun_cushion_ms ({}) exceeds max_lead_ms ({})",
                self.audio.underrun_cushion_ms, self.audio.max_lead_ms
            )));
        }
        Ok(())
    }

    /// Builder: set max memory
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.runtime.max_memory = bytes;
        self
    }

    /// Builder: set fuel limit
    pub fn fuel_limit(mut self, fuel: u64) -> Self {
        self.runtime.fuel_limit = Some(fuel);
        self
    }

    /// Builder: set optimization level
    pub fn optimize(mut self, level: u8) -> Self {
        self.runtime.optimization_level = level.min(3);
        self
    }

    /// Builder: end the run loop when a frame returns false
    pub fn stop_on_false_frame(mut self, stop: bool) -> Self {
        self.runtime.stop_on_false_frame = stop;
        self
    }

    /// Builder: set window title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.window.title = title.into();
        self
    }

    /// Builder: set drawable size
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.window.width = width;
        self.window.height = height;
        self
    }

    /// Builder: set frame callback rate
    pub fn refresh_rate(mut self, hz: u32) -> Self {
        self.window.refresh_rate = hz;
        self
    }

    /// Builder: set audio pacing
    pub fn audio(mut self, audio: AudioConfig) -> Self {
        self.audio = audio;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.runtime.max_memory, 256 * 1024 * 1024);
        assert!(config.runtime.trap_unknown_imports);
        assert!(!config.runtime.stop_on_false_frame);
        assert_eq!(config.audio.max_lead_ms, 200);
        assert_eq!(config.audio.underrun_cushion_ms, 70);
        assert_eq!(config.window.refresh_rate, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_audio_seconds() {
        let audio = AudioConfig::default();
        assert!((audio.max_lead() - 0.2).abs() < 1e-12);
        assert!((audio.underrun_cushion() - 0.07).abs() < 1e-12);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{ "window": { "title": "demo", "refresh_rate": 30 } }"#).unwrap();
        assert_eq!(config.window.title, "demo");
        assert_eq!(config.window.refresh_rate, 30);
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BridgeConfig::default();
        config.window.refresh_rate = 0;
        assert!(config.validate().is_err());

        let config = BridgeConfig::default().audio(AudioConfig {
            max_lead_ms: 50,
            underrun_cushion_ms: 70,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = BridgeConfig::headless()
            .max_memory(32 * 1024 * 1024)
            .fuel_limit(1_000_000)
            .optimize(9)
            .title("game")
            .size(320, 240)
            .refresh_rate(30);

        assert_eq!(config.runtime.max_memory, 32 * 1024 * 1024);
        assert_eq!(config.runtime.fuel_limit, Some(1_000_000));
        assert_eq!(config.runtime.optimization_level, 3);
        assert_eq!(config.window.title, "game");
        assert_eq!((config.window.width, config.window.height), (320, 240));
        assert_eq!(config.window.frame_interval(), Duration::from_secs_f64(1.0 / 30.0));
    }
}
