//! Fixed-capacity mirror of the hardware layer array
//!
//! After [`LayerList::update_list`] the list holds one layer per renderable,
//! in paint order, followed by the reserved layers. Reserved layers always sit
//! at the trailing positions: with two reserved layers the skip layer comes
//! first and the framebuffer target last.

use crate::error::LayerError;
use crate::hwc::device::{CompositionType, DisplayContents, HwcLayer};
use crate::hwc::layer::{Layer, LayerSlot, LayerType};
use crate::renderable::{Renderable, RenderableList};
use log::debug;

#[derive(Debug)]
pub struct LayerList {
    contents: DisplayContents,
    slots: Vec<LayerSlot>,
    renderable_count: usize,
    max_layers: usize,
}

impl LayerList {
    pub fn new(max_layers: usize) -> Self {
        Self {
            contents: DisplayContents::default(),
            slots: Vec::new(),
            renderable_count: 0,
            max_layers,
        }
    }

    /// Mirrors `renderables` plus `reserved` trailing layers.
    ///
    /// The renderable layers are set up as GPU-rendered candidates; the
    /// reserved layers are left to the caller. Records survive from the
    /// previous frame when the list keeps its size, which is what lets
    /// unchanged layers skip a commit. Returns whether any renderable layer
    /// needs a commit.
    pub fn update_list(
        &mut self,
        renderables: &RenderableList,
        reserved: usize,
    ) -> Result<bool, LayerError> {
        let needed = renderables.len() + reserved;
        if needed > self.max_layers {
            return Err(LayerError::TooManyLayers {
                requested: needed,
                max: self.max_layers,
            });
        }

        if needed != self.contents.layers.len() {
            debug!(
                "🧩 Layer list resized {} -> {}",
                self.contents.layers.len(),
                needed
            );
            self.contents.layers.clear();
            self.contents.layers.resize_with(needed, HwcLayer::default);
            self.slots.clear();
            self.slots.resize_with(needed, LayerSlot::default);
        }
        self.renderable_count = renderables.len();

        let mut needs_commit = false;
        for (index, renderable) in renderables.iter().enumerate() {
            let buffer = renderable.buffer();
            let mut layer = self.layer_unchecked(index);
            needs_commit |= layer.setup_layer(
                LayerType::GlRendered,
                renderable.screen_position(),
                renderable.shaped(),
                &buffer,
            )?;
        }
        Ok(needs_commit)
    }

    fn layer_unchecked(&mut self, index: usize) -> Layer<'_> {
        Layer::new(&mut self.contents.layers[index], &mut self.slots[index])
    }

    pub fn layer_mut(&mut self, index: usize) -> Result<Layer<'_>, LayerError> {
        let len = self.len();
        if index >= len {
            return Err(LayerError::OutOfRange { index, len });
        }
        Ok(self.layer_unchecked(index))
    }

    /// The last layer, which receives GPU-composited content
    pub fn framebuffer_target_mut(&mut self) -> Result<Layer<'_>, LayerError> {
        let len = self.len();
        if len == 0 || len == self.renderable_count {
            return Err(LayerError::OutOfRange { index: len, len });
        }
        Ok(self.layer_unchecked(len - 1))
    }

    /// All layers in array order
    pub fn layers_mut(&mut self) -> impl Iterator<Item = Layer<'_>> {
        self.contents
            .layers
            .iter_mut()
            .zip(self.slots.iter_mut())
            .map(|(record, slot)| Layer::new(record, slot))
    }

    /// Layers mirroring renderables, in list order
    pub fn renderable_layers_mut(&mut self) -> impl Iterator<Item = Layer<'_>> {
        let count = self.renderable_count;
        self.layers_mut().take(count)
    }

    /// Whether anything changed since the last commit. Layers the hardware
    /// left to the GPU always count as changed.
    pub fn needs_commit(&self) -> bool {
        self.slots.iter().any(LayerSlot::needs_commit)
            || self
                .contents
                .layers
                .iter()
                .take(self.renderable_count)
                .any(|l| l.composition_type == CompositionType::Framebuffer)
    }

    pub fn len(&self) -> usize {
        self.contents.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.layers.is_empty()
    }

    pub fn renderable_count(&self) -> usize {
        self.renderable_count
    }

    pub fn max_layers(&self) -> usize {
        self.max_layers
    }

    pub fn contents(&self) -> &DisplayContents {
        &self.contents
    }

    /// The raw array for `prepare`/`set`
    pub fn contents_mut(&mut self) -> &mut DisplayContents {
        &mut self.contents
    }
}
