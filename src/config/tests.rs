//! Unit tests for configuration module
//!
//! Tests configuration parsing, validation, serialization/deserialization,
//! and edge cases in configuration handling.

use super::*;
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_default_configuration_is_valid() {
    let config = StrataConfig::default();

    assert!(config.hwc.overlay_optimization);
    assert!(!config.hwc.force_skip_layer);
    assert_eq!(config.hwc.max_layers, None);
    assert_eq!(config.hwc.report, ReportMode::Off);
    assert_eq!(config.fences.wait_timeout_ms, 5000);
    assert_eq!(config.display.framebuffers, 2);
    assert_eq!(config.display.orientation, Orientation::Normal);
    assert_eq!(config.vsync.timeout_ms, 100);

    assert!(config.validate().is_ok());
}

#[test]
fn test_configuration_serialization_roundtrip() -> Result<()> {
    let mut original = StrataConfig::default();
    original.hwc.max_layers = Some(6);
    original.hwc.report = ReportMode::Formatted;
    original.display.orientation = Orientation::Left;

    let toml_string = toml::to_string(&original)?;
    let deserialized: StrataConfig = toml::from_str(&toml_string)?;

    assert_eq!(original, deserialized);
    Ok(())
}

#[test]
fn test_partial_sections_fill_in_defaults() -> Result<()> {
    let config: StrataConfig = toml::from_str(
        r#"
[hwc]
force_skip_layer = true

[fences]
wait_timeout_ms = 750

[display]
orientation = "inverted"
"#,
    )?;

    assert!(config.hwc.overlay_optimization);
    assert!(config.hwc.force_skip_layer);
    assert_eq!(config.hwc.report, ReportMode::Off);
    assert_eq!(config.fences.wait_timeout_ms, 750);
    assert_eq!(config.display.framebuffers, 2);
    assert_eq!(config.display.orientation, Orientation::Inverted);
    assert_eq!(config.display.alpha_tolerance, 1e-3);
    assert_eq!(config.vsync.timeout_ms, 100);
    assert!(config.validate().is_ok());
    Ok(())
}

#[test]
fn test_configuration_from_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("strata.toml");
    fs::write(
        &path,
        r#"
[hwc]
overlay_optimization = false
force_skip_layer = true
max_layers = 5
report = "formatted"

[fences]
wait_timeout_ms = 250

[display]
framebuffers = 3
orientation = "right"
alpha_tolerance = 0.01

[vsync]
timeout_ms = 40
"#,
    )?;

    let config = StrataConfig::load(&path)?;

    assert!(!config.hwc.overlay_optimization);
    assert!(config.hwc.force_skip_layer);
    assert_eq!(config.hwc.max_layers, Some(5));
    assert_eq!(config.hwc.report, ReportMode::Formatted);
    assert_eq!(config.fences.wait_timeout(), Duration::from_millis(250));
    assert_eq!(config.display.framebuffers, 3);
    assert_eq!(config.display.orientation, Orientation::Right);
    assert_eq!(config.vsync.timeout(), Duration::from_millis(40));
    Ok(())
}

#[test]
fn test_missing_sections_use_defaults() -> Result<()> {
    let config: StrataConfig = toml::from_str(
        r#"
[display]
framebuffers = 4
alpha_tolerance = 0.001
"#,
    )?;

    assert_eq!(config.display.framebuffers, 4);
    assert_eq!(config.display.orientation, Orientation::Normal);
    assert_eq!(config.hwc, HwcConfig::default());
    assert_eq!(config.fences, FenceConfig::default());
    assert_eq!(config.vsync, VsyncConfig::default());
    Ok(())
}

#[test]
fn test_empty_file_is_default() -> Result<()> {
    let config: StrataConfig = toml::from_str("")?;
    assert_eq!(config, StrataConfig::default());
    Ok(())
}

#[test]
fn test_validation_rejects_small_layer_array() {
    let mut config = StrataConfig::default();
    config.hwc.max_layers = Some(1);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("max_layers"));

    config.hwc.max_layers = Some(2);
    assert!(config.validate().is_ok());
}

#[test]
fn test_validation_rejects_fence_timeouts_out_of_range() {
    let mut config = StrataConfig::default();
    config.fences.wait_timeout_ms = 0;
    assert!(config.validate().is_err());

    config.fences.wait_timeout_ms = 60_001;
    assert!(config.validate().is_err());

    config.fences.wait_timeout_ms = 60_000;
    assert!(config.validate().is_ok());
}

#[test]
fn test_validation_rejects_framebuffer_count() {
    let mut config = StrataConfig::default();
    for count in [0, 1, 5] {
        config.display.framebuffers = count;
        assert!(config.validate().is_err(), "{} framebuffers accepted", count);
    }
}

#[test]
fn test_validation_rejects_alpha_tolerance() {
    let mut config = StrataConfig::default();
    for tolerance in [-0.1, 0.5, 1.0, f32::NAN] {
        config.display.alpha_tolerance = tolerance;
        assert!(config.validate().is_err(), "tolerance {} accepted", tolerance);
    }
}

#[test]
fn test_validation_rejects_zero_vsync_timeout() {
    let mut config = StrataConfig::default();
    config.vsync.timeout_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_load_rejects_invalid_values() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[display]\nframebuffers = 9\nalpha_tolerance = 0.001\n")?;

    let err = StrataConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("framebuffers"));
    Ok(())
}

#[test]
fn test_load_reports_unknown_orientation() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bad.toml");
    fs::write(
        &path,
        "[display]\nframebuffers = 2\nalpha_tolerance = 0.001\norientation = \"sideways\"\n",
    )?;

    let err = StrataConfig::load(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
    Ok(())
}

#[test]
fn test_load_missing_file() {
    let result = StrataConfig::load("/nonexistent/strata.toml");
    assert!(result.is_err());
}

#[test]
fn test_save_and_reload() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("saved.toml");

    let mut config = StrataConfig::default();
    config.hwc.overlay_optimization = false;
    config.display.framebuffers = 3;
    config.save(&path)?;

    let reloaded = StrataConfig::load(&path)?;
    assert_eq!(config, reloaded);
    Ok(())
}

#[test]
fn test_composer_config_follows_sections() {
    let mut config = StrataConfig::default();
    config.hwc.force_skip_layer = true;
    config.hwc.max_layers = Some(3);
    config.display.alpha_tolerance = 0.05;

    let composer = config.composer_config();
    assert!(composer.overlay_optimization);
    assert!(composer.force_skip_layer);
    assert_eq!(composer.max_layers, Some(3));
    assert_eq!(composer.alpha_tolerance, 0.05);
}
