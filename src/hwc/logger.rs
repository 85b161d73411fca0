//! Reporting of the layer lists exchanged with the hardware composer
//!
//! [`FormattedHwcLogger`] prints one table per HAL call so overlay decisions
//! can be followed frame by frame. It is separate from the `log` output and
//! selected with `hwc.report = "formatted"`.

use crate::hwc::device::{Blending, CompositionType, DisplayContents, HwcLayer, HwcRect};
use crate::geometry::Orientation;
use log::warn;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::io::{self, Write};

const SEPARATOR: &str = " | ";
const LAYER_NUM_WIDTH: usize = 2;
const RECT_MEMBER_WIDTH: usize = 4;
const TRANSFORM_WIDTH: usize = 9;
const BLENDING_WIDTH: usize = 8;
const TYPE_WIDTH: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayOptimization {
    Enabled,
    Disabled,
}

impl From<bool> for OverlayOptimization {
    fn from(enabled: bool) -> Self {
        if enabled {
            OverlayOptimization::Enabled
        } else {
            OverlayOptimization::Disabled
        }
    }
}

pub trait HwcLogger: Send + Sync {
    fn log_list_submitted_to_prepare(&self, contents: &DisplayContents);

    fn log_prepare_done(&self, contents: &DisplayContents);

    fn log_set_list(&self, contents: &DisplayContents);

    fn log_overlay_optimization(&self, optimization: OverlayOptimization);

    fn log_display_on_off(&self, on: bool);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHwcLogger;

impl HwcLogger for NullHwcLogger {
    fn log_list_submitted_to_prepare(&self, _contents: &DisplayContents) {}
    fn log_prepare_done(&self, _contents: &DisplayContents) {}
    fn log_set_list(&self, _contents: &DisplayContents) {}
    fn log_overlay_optimization(&self, _optimization: OverlayOptimization) {}
    fn log_display_on_off(&self, _on: bool) {}
}

fn layer_number(index: usize) -> String {
    format!("{:>width$}", index % 100, width = LAYER_NUM_WIDTH)
}

fn rect(r: &HwcRect) -> String {
    format!(
        "{{{:>w$},{:>w$},{:>w$},{:>w$}}}",
        r.left,
        r.top,
        r.right,
        r.bottom,
        w = RECT_MEMBER_WIDTH
    )
}

fn transform(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Normal => "NONE",
        Orientation::Left => "ROT_90",
        Orientation::Inverted => "ROT_180",
        Orientation::Right => "ROT_270",
    }
}

fn blending(blending: Blending) -> &'static str {
    match blending {
        Blending::None => "NONE",
        Blending::Premultiplied => "PREMULT",
        Blending::Coverage => "COVERAGE",
    }
}

fn layer_type(layer: &HwcLayer) -> &'static str {
    match layer.composition_type {
        CompositionType::Overlay => "OVERLAY",
        CompositionType::Framebuffer if layer.skip => "FORCE_GL",
        CompositionType::Framebuffer => "GL_RENDER",
        CompositionType::FramebufferTarget => "FB_TARGET",
    }
}

pub fn format_prepare_list(contents: &DisplayContents) -> String {
    let mut out = String::from("before prepare():\n");
    out.push_str(" # | pos {l,t,r,b}         | crop {l,t,r,b}        | transform | blending | \n");
    for (i, layer) in contents.layers.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}{sep}{}{sep}{}{sep}{:<tw$}{sep}{:<bw$}{sep}",
            layer_number(i),
            rect(&layer.display_frame),
            rect(&layer.source_crop),
            transform(layer.transform),
            blending(layer.blending),
            sep = SEPARATOR,
            tw = TRANSFORM_WIDTH,
            bw = BLENDING_WIDTH,
        );
    }
    out
}

pub fn format_prepare_done(contents: &DisplayContents) -> String {
    let mut out = String::from("after prepare():\n");
    out.push_str(" # | Type      | \n");
    for (i, layer) in contents.layers.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}{sep}{:<w$}{sep}",
            layer_number(i),
            layer_type(layer),
            sep = SEPARATOR,
            w = TYPE_WIDTH,
        );
    }
    out
}

pub fn format_set_list(contents: &DisplayContents) -> String {
    let mut out = String::from("set list():\n");
    out.push_str(" # | handle | acquire fence\n");
    for (i, layer) in contents.layers.iter().enumerate() {
        let handle = layer
            .handle
            .map_or_else(|| "none".to_string(), |h| h.to_string());
        let fence = if layer.acquire_fence.is_signaled() {
            "signaled"
        } else {
            "pending"
        };
        let _ = writeln!(out, "{}{sep}{}{sep}{}", layer_number(i), handle, fence, sep = SEPARATOR);
    }
    out
}

pub fn format_overlay_optimization(optimization: OverlayOptimization) -> String {
    let state = match optimization {
        OverlayOptimization::Enabled => "ON",
        OverlayOptimization::Disabled => "OFF",
    };
    format!("HWC overlay optimizations are {}\n", state)
}

pub fn format_display_on_off(on: bool) -> String {
    format!("HWC blank: screen is {}\n", if on { "ON" } else { "OFF" })
}

/// Prints tables to a writer, stdout by default
pub struct FormattedHwcLogger {
    out: Mutex<Box<dyn Write + Send>>,
}

impl FormattedHwcLogger {
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn emit(&self, text: &str) {
        let mut out = self.out.lock();
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
            warn!("⚠️ HWC report write failed: {}", e);
        }
    }
}

impl Default for FormattedHwcLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl HwcLogger for FormattedHwcLogger {
    fn log_list_submitted_to_prepare(&self, contents: &DisplayContents) {
        self.emit(&format_prepare_list(contents));
    }

    fn log_prepare_done(&self, contents: &DisplayContents) {
        self.emit(&format_prepare_done(contents));
    }

    fn log_set_list(&self, contents: &DisplayContents) {
        self.emit(&format_set_list(contents));
    }

    fn log_overlay_optimization(&self, optimization: OverlayOptimization) {
        self.emit(&format_overlay_optimization(optimization));
    }

    fn log_display_on_off(&self, on: bool) {
        self.emit(&format_display_on_off(on));
    }
}
