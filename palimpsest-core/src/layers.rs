//! # Layers
//!
//! A layer is a bitmap plus the log of every command that built it. Layers are shared behind a
//! [`LayerHandle`], and the handle is what moves around when structural commands take a layer out of the
//! document and later put it back - the layer's bitmap and history travel with it, untouched.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{bitmap::Bitmap, history::LayerHistory, id::LayerID};

#[derive(Debug)]
pub struct Layer {
    id: LayerID,
    pub name: String,
    pub(crate) bitmap: Bitmap,
    pub(crate) history: LayerHistory,
}
impl Layer {
    #[must_use]
    pub fn new(id: LayerID, name: String, bitmap: Bitmap, history: LayerHistory) -> Self {
        Self {
            id,
            name,
            bitmap,
            history,
        }
    }
    #[must_use]
    pub fn id(&self) -> LayerID {
        self.id
    }
    #[must_use]
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }
    #[must_use]
    pub fn history(&self) -> &LayerHistory {
        &self.history
    }
}

/// A layer behind its lock, along with the undo and redo availability its history had when the lock was
/// last released. Those can be read while someone else holds the layer, for instance during a replay.
#[derive(Debug)]
pub struct LayerCell {
    layer: parking_lot::Mutex<Layer>,
    can_undo: AtomicBool,
    can_redo: AtomicBool,
}
impl From<Layer> for LayerCell {
    fn from(layer: Layer) -> Self {
        Self {
            can_undo: layer.history.can_undo().into(),
            can_redo: layer.history.can_redo().into(),
            layer: parking_lot::Mutex::new(layer),
        }
    }
}
impl LayerCell {
    /// Locking is the only way to read or write the layer.
    pub fn lock(&self) -> LayerGuard<'_> {
        LayerGuard {
            layer: self.layer.lock(),
            cell: self,
        }
    }
    /// `(can_undo, can_redo)` as of the last unlock. Never blocks.
    #[must_use]
    pub fn published(&self) -> (bool, bool) {
        (
            self.can_undo.load(Ordering::Acquire),
            self.can_redo.load(Ordering::Acquire),
        )
    }
}

/// Publishes the history's availability when dropped, just before the layer unlocks.
pub struct LayerGuard<'a> {
    layer: parking_lot::MutexGuard<'a, Layer>,
    cell: &'a LayerCell,
}
impl std::ops::Deref for LayerGuard<'_> {
    type Target = Layer;
    fn deref(&self) -> &Layer {
        &self.layer
    }
}
impl std::ops::DerefMut for LayerGuard<'_> {
    fn deref_mut(&mut self) -> &mut Layer {
        &mut self.layer
    }
}
impl Drop for LayerGuard<'_> {
    fn drop(&mut self) {
        let history = &self.layer.history;
        self.cell.can_undo.store(history.can_undo(), Ordering::Release);
        self.cell.can_redo.store(history.can_redo(), Ordering::Release);
    }
}

pub type LayerHandle = Arc<LayerCell>;

/// The layers currently part of the document, their stacking order, and which one is active.
#[derive(Debug)]
pub struct LayerSet {
    /// Bottom first.
    order: Vec<LayerID>,
    layers: hashbrown::HashMap<LayerID, LayerHandle>,
    active: LayerID,
}
impl LayerSet {
    /// A set containing one layer, which is active.
    #[must_use]
    pub fn new(id: LayerID, layer: LayerHandle) -> Self {
        let mut layers = hashbrown::HashMap::new();
        layers.insert(id, layer);
        Self {
            order: vec![id],
            layers,
            active: id,
        }
    }
    /// IDs, bottom first.
    #[must_use]
    pub fn ids(&self) -> &[LayerID] {
        &self.order
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
    #[must_use]
    pub fn contains(&self, id: LayerID) -> bool {
        self.layers.contains_key(&id)
    }
    #[must_use]
    pub fn get(&self, id: LayerID) -> Option<&LayerHandle> {
        self.layers.get(&id)
    }
    /// Stacking position of the layer, zero at the bottom.
    #[must_use]
    pub fn position(&self, id: LayerID) -> Option<usize> {
        self.order.iter().position(|&other| other == id)
    }
    #[must_use]
    pub fn active(&self) -> LayerID {
        self.active
    }
    /// Returns false if the layer isn't in the set, in which case nothing changes.
    pub fn set_active(&mut self, id: LayerID) -> bool {
        let present = self.contains(id);
        if present {
            self.active = id;
        }
        present
    }
    /// Insert a layer at a stacking position, clamped to the top. Does not change the active layer.
    pub fn insert(&mut self, position: usize, id: LayerID, layer: LayerHandle) {
        debug_assert!(!self.contains(id), "{id} inserted twice");
        let position = position.min(self.order.len());
        self.order.insert(position, id);
        self.layers.insert(id, layer);
    }
    /// Remove a layer, returning where it was and its handle.
    ///
    /// If it was active, the layer below it (or above, if it was at the bottom) becomes active.
    /// Taking the last layer leaves the set empty with a dangling active ID, which callers must prevent.
    pub fn take(&mut self, id: LayerID) -> Option<(usize, LayerHandle)> {
        let layer = self.layers.remove(&id)?;
        // Present in map implies present in order.
        let position = self.position(id)?;
        self.order.remove(position);
        if self.active == id {
            if let Some(&neighbor) = self.order.get(position.saturating_sub(1)) {
                self.active = neighbor;
            }
        }
        Some((position, layer))
    }
}
