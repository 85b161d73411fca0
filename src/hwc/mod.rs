//! Hardware composer: layer list, overlay decisions and the commit protocol

pub mod composer;
pub mod device;
pub mod layer;
pub mod layer_list;
pub mod logger;

pub use composer::{
    check_compatibility, CommitSummary, Compatibility, ComposerConfig, ComposerStats, GpuFallback,
    HwcComposer, PostOutcome,
};
pub use device::{
    Blending, CompositionType, DisplayContents, HwcCallbacks, HwcDevice, HwcLayer, HwcRect,
    PRIMARY_DISPLAY,
};
pub use layer::{Layer, LayerType};
pub use layer_list::LayerList;
pub use logger::{FormattedHwcLogger, HwcLogger, NullHwcLogger, OverlayOptimization};
