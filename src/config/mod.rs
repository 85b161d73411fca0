//! Configuration management for strata
//!
//! Loads, validates and saves the TOML configuration covering the hardware
//! composer, fence waits, the display and frame pacing.

use crate::geometry::Orientation;
use crate::hwc::composer::ComposerConfig;
use crate::hwc::logger::{FormattedHwcLogger, HwcLogger, NullHwcLogger};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration struct containing all strata settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StrataConfig {
    /// Hardware composer behaviour
    #[serde(default)]
    pub hwc: HwcConfig,

    /// Fence wait limits
    #[serde(default)]
    pub fences: FenceConfig,

    /// Framebuffers and orientation
    #[serde(default)]
    pub display: DisplayConfig,

    /// Frame pacing
    #[serde(default)]
    pub vsync: VsyncConfig,
}

/// Where HWC layer lists are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    #[default]
    Off,
    /// Tables on stdout
    Formatted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HwcConfig {
    /// Offer frames to hardware overlays before falling back to the GPU
    pub overlay_optimization: bool,

    /// Put a skip layer in front of the framebuffer target on GPU frames
    pub force_skip_layer: bool,

    /// Cap on the layer array size, reserved layers included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_layers: Option<usize>,

    pub report: ReportMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FenceConfig {
    /// Longest wait on a single fence before the hardware is considered hung
    pub wait_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Number of framebuffer target buffers (2 to 4)
    pub framebuffers: usize,

    pub orientation: Orientation,

    /// How far below 1.0 alpha may be and still count as opaque
    pub alpha_tolerance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VsyncConfig {
    /// Longest the compositing thread waits for vsync after a frame
    pub timeout_ms: u64,
}

impl Default for HwcConfig {
    fn default() -> Self {
        Self {
            overlay_optimization: true,
            force_skip_layer: false,
            max_layers: None,
            report: ReportMode::Off,
        }
    }
}

impl Default for FenceConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 5000,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            framebuffers: 2,
            orientation: Orientation::Normal,
            alpha_tolerance: 1e-3,
        }
    }
}

impl Default for VsyncConfig {
    fn default() -> Self {
        Self { timeout_ms: 100 }
    }
}

impl HwcConfig {
    pub fn composer_config(&self, alpha_tolerance: f32) -> ComposerConfig {
        ComposerConfig {
            overlay_optimization: self.overlay_optimization,
            force_skip_layer: self.force_skip_layer,
            alpha_tolerance,
            max_layers: self.max_layers,
        }
    }

    pub fn logger(&self) -> Box<dyn HwcLogger> {
        match self.report {
            ReportMode::Off => Box::new(NullHwcLogger),
            ReportMode::Formatted => Box::new(FormattedHwcLogger::new()),
        }
    }
}

impl FenceConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl VsyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl StrataConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Path::new(&home).join(path.strip_prefix("~").unwrap_or(path))
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: StrataConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // One renderable plus the framebuffer target at minimum
        if let Some(max) = self.hwc.max_layers {
            if max < 2 {
                anyhow::bail!("Invalid hwc.max_layers: must be at least 2, got {}", max);
            }
        }

        if !(1..=60_000).contains(&self.fences.wait_timeout_ms) {
            anyhow::bail!("Invalid fences.wait_timeout_ms: must be between 1 and 60000");
        }

        if !(2..=4).contains(&self.display.framebuffers) {
            anyhow::bail!("Invalid display.framebuffers: must be between 2 and 4");
        }

        let tolerance = self.display.alpha_tolerance;
        if !(0.0..0.5).contains(&tolerance) {
            anyhow::bail!("Invalid display.alpha_tolerance: must be in [0.0, 0.5)");
        }

        if self.vsync.timeout_ms == 0 {
            anyhow::bail!("Invalid vsync.timeout_ms: must be greater than 0");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }

    pub fn composer_config(&self) -> ComposerConfig {
        self.hwc.composer_config(self.display.alpha_tolerance)
    }
}

#[cfg(test)]
mod tests;

#[cfg(test)]
mod property_tests;
