//! Error taxonomy for the composition engine
//!
//! Errors fall into three classes:
//! - **Fatal device errors**: hardware init failure, whole-call `prepare`/`set`
//!   failure, GL program build failure, fence waits that exceed the ceiling.
//!   These abort the affected display and are returned to the caller.
//! - **Per-layer rejection**: not an error at all. The hardware declining a
//!   layer is reported through the layer's composition type.
//! - **Cleanup errors**: raised during teardown. These are logged by the code
//!   that hits them and never leave a `Drop` impl.

use std::time::Duration;
use thiserror::Error;

/// Fence wait and merge failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FenceError {
    /// The fence did not signal within the wait ceiling. Treated as a hardware hang.
    #[error("fence wait timed out after {waited:?}")]
    Timeout { waited: Duration },
}

/// Buffer access failures
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer {0} is not mappable for CPU access")]
    NotMappable(u64),

    #[error("buffer upload failed: {0}")]
    Upload(String),

    #[error("invalid buffer geometry {width}x{height} (stride {stride})")]
    InvalidGeometry { width: i32, height: i32, stride: u32 },

    #[error(transparent)]
    Fence(#[from] FenceError),
}

/// GPU compositor failures
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    #[error("program link failed: {0}")]
    ProgramLink(String),

    #[error("GL error 0x{0:04x}")]
    Gl(u32),

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Whole-call hardware composer failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HwcError {
    #[error("hwc prepare() failed with status {0}")]
    Prepare(i32),

    #[error("hwc set() failed with status {0}")]
    Set(i32),

    #[error("hwc blank({blank}) failed with status {status}")]
    Blank { blank: bool, status: i32 },

    #[error("hwc vsync control (enable: {enable}) failed with status {status}")]
    EventControl { enable: bool, status: i32 },

    #[error("hwc device unavailable: {0}")]
    Unavailable(String),
}

/// Layer list misuse
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error("layer type {0} may only be assigned by the hardware")]
    InvalidLayerType(&'static str),

    #[error("{requested} layers exceed the hardware maximum of {max}")]
    TooManyLayers { requested: usize, max: usize },

    #[error("layer index {index} out of range (list has {len} layers)")]
    OutOfRange { index: usize, len: usize },
}

/// Umbrella error for one composition pass
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error(transparent)]
    Hwc(#[from] HwcError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Fence(#[from] FenceError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error("invalid display configuration: {0}")]
    Configuration(String),
}

impl CompositionError {
    /// Whether the display must be considered failed.
    ///
    /// Configuration errors are the caller's mistake and leave the device
    /// usable; everything else means the device can no longer present.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CompositionError::Configuration(_))
    }
}

pub type Result<T, E = CompositionError> = std::result::Result<T, E>;
