//! Per-renderable texture cache
//!
//! Each renderable id owns at most one GPU texture. A texture is re-uploaded
//! only when the renderable is showing a different buffer than the one last
//! uploaded, or after [`TextureCache::suspend`] (the GL context may have lost
//! its contents). Textures of renderables that were not drawn during a frame
//! are released at the end of that frame.
//!
//! The cache is owned by a single [`GlRenderer`](super::GlRenderer) and only
//! touched from the compositor thread, so it carries no locking.

use crate::buffer::{Buffer, BufferId};
use crate::error::RenderError;
use crate::renderable::RenderableId;
use crate::renderer::backend::{GlBackend, TextureId};
use log::debug;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

#[derive(Debug)]
struct CacheEntry {
    texture: TextureId,
    /// Buffer the texture content was last uploaded from
    origin: Option<BufferId>,
    /// Drawn during the current frame
    used: bool,
}

/// Statistics about texture cache behaviour
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Texture lookups this frame
    pub lookups: usize,
    /// Lookups that needed a buffer upload
    pub uploads: usize,
    /// Textures released at the end of the last frame
    pub evictions: usize,
}

impl CacheStats {
    /// Percentage of lookups served without an upload
    pub fn reuse_rate(&self) -> f32 {
        if self.lookups == 0 {
            return 0.0;
        }
        ((self.lookups - self.uploads) as f32 / self.lookups as f32) * 100.0
    }
}

#[derive(Debug, Default)]
pub struct TextureCache {
    entries: HashMap<RenderableId, CacheEntry>,
    /// Force re-upload of everything on the next frame
    skipped: bool,
    stats: CacheStats,
    last_frame_stats: CacheStats,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the texture for `id`, bound, with `buffer`'s content
    pub fn load<B: GlBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        id: RenderableId,
        buffer: &dyn Buffer,
    ) -> Result<TextureId, RenderError> {
        self.stats.lookups += 1;

        let entry = match self.entries.entry(id) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                backend.bind_texture(entry.texture);
                entry
            }
            Entry::Vacant(vacant) => {
                let texture = backend.create_texture();
                debug!("🆕 Texture {:?} created for renderable {}", texture, id);
                vacant.insert(CacheEntry {
                    texture,
                    origin: None,
                    used: false,
                })
            }
        };
        entry.used = true;

        let buffer_id = buffer.id();
        if entry.origin != Some(buffer_id) || self.skipped {
            // Clear the origin first so a failed upload is retried next frame
            entry.origin = None;
            backend.upload_texture(entry.texture, buffer)?;
            entry.origin = Some(buffer_id);
            self.stats.uploads += 1;
        }

        Ok(entry.texture)
    }

    /// Releases textures not used this frame and resets the per-frame flags.
    /// Returns the number of evicted textures.
    pub fn end_frame<B: GlBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let mut evicted = 0;
        self.entries.retain(|id, entry| {
            if entry.used {
                entry.used = false;
                true
            } else {
                debug!("🗑️ Releasing texture {:?} of renderable {}", entry.texture, id);
                backend.delete_texture(entry.texture);
                evicted += 1;
                false
            }
        });
        self.skipped = false;

        self.stats.evictions = evicted;
        self.last_frame_stats = std::mem::take(&mut self.stats);
        evicted
    }

    /// Forces every texture to be re-uploaded on its next use
    pub fn suspend(&mut self) {
        self.skipped = true;
    }

    /// Releases every texture
    pub fn release_all<B: GlBackend + ?Sized>(&mut self, backend: &mut B) {
        for (_, entry) in self.entries.drain() {
            backend.delete_texture(entry.texture);
        }
    }

    pub fn contains(&self, id: RenderableId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn texture_for(&self, id: RenderableId) -> Option<TextureId> {
        self.entries.get(&id).map(|e| e.texture)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Statistics of the frame in progress
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Statistics of the last completed frame
    pub fn last_frame_stats(&self) -> &CacheStats {
        &self.last_frame_stats
    }
}
