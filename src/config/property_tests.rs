//! Property-based tests for configuration module
//!
//! These tests use proptest to generate random configurations and verify
//! validation boundaries and serialization round-trips.

use super::*;
use proptest::prelude::*;

fn orientation() -> impl Strategy<Value = Orientation> {
    prop_oneof![
        Just(Orientation::Normal),
        Just(Orientation::Left),
        Just(Orientation::Inverted),
        Just(Orientation::Right),
    ]
}

// Strategy for generating valid configurations
prop_compose! {
    fn valid_config()(
        overlay_optimization in any::<bool>(),
        force_skip_layer in any::<bool>(),
        max_layers in proptest::option::of(2usize..64),
        formatted in any::<bool>(),
        wait_timeout_ms in 1u64..=60_000,
        framebuffers in 2usize..=4,
        orientation in orientation(),
        alpha_tolerance in 0.0f32..0.5,
        vsync_timeout_ms in 1u64..10_000,
    ) -> StrataConfig {
        StrataConfig {
            hwc: HwcConfig {
                overlay_optimization,
                force_skip_layer,
                max_layers,
                report: if formatted { ReportMode::Formatted } else { ReportMode::Off },
            },
            fences: FenceConfig { wait_timeout_ms },
            display: DisplayConfig {
                framebuffers,
                orientation,
                alpha_tolerance,
            },
            vsync: VsyncConfig { timeout_ms: vsync_timeout_ms },
        }
    }
}

proptest! {
    #[test]
    fn prop_valid_configs_validate(config in valid_config()) {
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn prop_valid_configs_roundtrip(config in valid_config()) {
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: StrataConfig = toml::from_str(&text).unwrap();
        prop_assert_eq!(parsed, config);
    }

    #[test]
    fn prop_framebuffer_count_outside_range_is_rejected(
        config in valid_config(),
        count in prop_oneof![0usize..2, 5usize..100],
    ) {
        let mut config = config;
        config.display.framebuffers = count;
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn prop_long_fence_timeouts_are_rejected(
        config in valid_config(),
        timeout in 60_001u64..u64::MAX,
    ) {
        let mut config = config;
        config.fences.wait_timeout_ms = timeout;
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn prop_large_alpha_tolerance_is_rejected(
        config in valid_config(),
        tolerance in 0.5f32..100.0,
    ) {
        let mut config = config;
        config.display.alpha_tolerance = tolerance;
        prop_assert!(config.validate().is_err());
    }
}
