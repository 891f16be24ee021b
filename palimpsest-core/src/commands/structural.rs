//! # Structural commands
//!
//! Commands that change which layers exist, rather than what is on them. They are reversed by moving layer
//! handles in and out of the [`LayerSet`], never by recomputing pixels: a layer leaving the document is parked
//! inside the command that removed it, bitmap and history intact, until that command is reversed.

use crate::{
    id::LayerID,
    layers::{LayerHandle, LayerSet},
};

use super::StructuralSummary;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("{0} does not exist")]
    UnknownLayer(LayerID),
    #[error("the last layer cannot be removed")]
    LastLayer,
    #[error("cannot merge {0} with itself")]
    SameLayer(LayerID),
    /// Only a layer and the one directly below it merge, anything else would reorder pixels.
    #[error("{upper} is not directly above {lower}")]
    NotAdjacent { upper: LayerID, lower: LayerID },
    #[error("layers are {lower:?} and {upper:?}, cannot merge")]
    Incompatible {
        upper: (u32, u32),
        lower: (u32, u32),
    },
    /// The document doesn't match the state the command was recorded against.
    #[error("layer set does not match the recorded command")]
    MismatchedState,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StructuralKind {
    AddLayer,
    RemoveLayer,
    MergeLayers,
}

#[derive(Debug)]
pub struct AddLayer {
    pub layer: LayerID,
    pub position: usize,
    pub previous_active: LayerID,
    /// Holds the layer while the addition is undone.
    pub(crate) parked: Option<LayerHandle>,
}
#[derive(Debug)]
pub struct RemoveLayer {
    pub layer: LayerID,
    pub position: usize,
    pub previous_active: LayerID,
    /// Holds the layer while the removal is in effect.
    pub(crate) parked: Option<LayerHandle>,
}
#[derive(Debug)]
pub struct MergeLayers {
    pub upper: LayerID,
    pub upper_position: usize,
    pub lower: LayerID,
    pub lower_position: usize,
    /// The layer created by the merge, placed where `lower` was.
    pub merged: LayerID,
    pub previous_active: LayerID,
    /// `[upper, lower]`, held while the merge is in effect.
    pub(crate) sources: Option<[LayerHandle; 2]>,
    /// Held while the merge is undone.
    pub(crate) parked_merged: Option<LayerHandle>,
}

#[derive(Debug)]
pub enum StructuralCommand {
    AddLayer(AddLayer),
    RemoveLayer(RemoveLayer),
    MergeLayers(MergeLayers),
}
impl From<AddLayer> for StructuralCommand {
    fn from(value: AddLayer) -> Self {
        Self::AddLayer(value)
    }
}
impl From<RemoveLayer> for StructuralCommand {
    fn from(value: RemoveLayer) -> Self {
        Self::RemoveLayer(value)
    }
}
impl From<MergeLayers> for StructuralCommand {
    fn from(value: MergeLayers) -> Self {
        Self::MergeLayers(value)
    }
}

/// Remove a layer, refusing to leave the set empty.
fn take_checked(layers: &mut LayerSet, id: LayerID) -> Result<LayerHandle, StructuralError> {
    if !layers.contains(id) {
        return Err(StructuralError::UnknownLayer(id));
    }
    if layers.len() <= 1 {
        return Err(StructuralError::LastLayer);
    }
    // Checked for presence above.
    layers
        .take(id)
        .map(|(_, handle)| handle)
        .ok_or(StructuralError::UnknownLayer(id))
}
fn insert_checked(
    layers: &mut LayerSet,
    position: usize,
    id: LayerID,
    handle: LayerHandle,
) -> Result<(), StructuralError> {
    if layers.contains(id) {
        return Err(StructuralError::MismatchedState);
    }
    layers.insert(position, id, handle);
    Ok(())
}

impl StructuralCommand {
    #[must_use]
    pub fn kind(&self) -> StructuralKind {
        match self {
            Self::AddLayer(_) => StructuralKind::AddLayer,
            Self::RemoveLayer(_) => StructuralKind::RemoveLayer,
            Self::MergeLayers(_) => StructuralKind::MergeLayers,
        }
    }
    #[must_use]
    pub fn summary(&self) -> StructuralSummary {
        let layers = match self {
            Self::AddLayer(AddLayer { layer, .. }) | Self::RemoveLayer(RemoveLayer { layer, .. }) => {
                smallvec::smallvec![*layer]
            }
            Self::MergeLayers(merge) => smallvec::smallvec![merge.upper, merge.lower, merge.merged],
        };
        StructuralSummary {
            kind: self.kind(),
            layers,
        }
    }
    /// Reverse the command.
    /// # Errors
    /// If the layer set is not in the state the command left it in. On error, nothing is changed.
    pub fn undo(&mut self, layers: &mut LayerSet) -> Result<(), StructuralError> {
        match self {
            Self::AddLayer(add) => {
                if add.parked.is_some() {
                    return Err(StructuralError::MismatchedState);
                }
                add.parked = Some(take_checked(layers, add.layer)?);
                // May have since been removed by something else, then the fallback from `take` stands.
                layers.set_active(add.previous_active);
            }
            Self::RemoveLayer(remove) => {
                let handle = remove
                    .parked
                    .take()
                    .ok_or(StructuralError::MismatchedState)?;
                if let Err(e) = insert_checked(layers, remove.position, remove.layer, handle.clone())
                {
                    remove.parked = Some(handle);
                    return Err(e);
                }
                layers.set_active(remove.layer);
            }
            Self::MergeLayers(merge) => {
                if merge.parked_merged.is_some()
                    || layers.contains(merge.upper)
                    || layers.contains(merge.lower)
                {
                    return Err(StructuralError::MismatchedState);
                }
                let [upper, lower] = merge
                    .sources
                    .take()
                    .ok_or(StructuralError::MismatchedState)?;
                // Never the last layer, both sources are about to be reinserted.
                let Some((_, merged)) = layers.take(merge.merged) else {
                    merge.sources = Some([upper, lower]);
                    return Err(StructuralError::UnknownLayer(merge.merged));
                };
                // Lower first, as positions were recorded bottom-up with both present.
                layers.insert(merge.lower_position, merge.lower, lower);
                layers.insert(merge.upper_position, merge.upper, upper);
                merge.parked_merged = Some(merged);
                if !layers.set_active(merge.previous_active) {
                    layers.set_active(merge.lower);
                }
            }
        }
        Ok(())
    }
    /// Re-apply a previously undone command.
    /// # Errors
    /// If the layer set is not in the state the undo left it in. On error, nothing is changed.
    pub fn redo(&mut self, layers: &mut LayerSet) -> Result<(), StructuralError> {
        match self {
            Self::AddLayer(add) => {
                let handle = add.parked.take().ok_or(StructuralError::MismatchedState)?;
                if let Err(e) = insert_checked(layers, add.position, add.layer, handle.clone()) {
                    add.parked = Some(handle);
                    return Err(e);
                }
                layers.set_active(add.layer);
            }
            Self::RemoveLayer(remove) => {
                if remove.parked.is_some() {
                    return Err(StructuralError::MismatchedState);
                }
                remove.parked = Some(take_checked(layers, remove.layer)?);
            }
            Self::MergeLayers(merge) => {
                if merge.sources.is_some()
                    || !layers.contains(merge.upper)
                    || !layers.contains(merge.lower)
                    || layers.contains(merge.merged)
                {
                    return Err(StructuralError::MismatchedState);
                }
                let merged = merge
                    .parked_merged
                    .take()
                    .ok_or(StructuralError::MismatchedState)?;
                // Presence checked above, and the merged layer keeps the set non-empty.
                let (Some((_, upper)), Some((_, lower))) =
                    (layers.take(merge.upper), layers.take(merge.lower))
                else {
                    unreachable!("presence checked above")
                };
                layers.insert(merge.lower_position, merge.merged, merged);
                layers.set_active(merge.merged);
                merge.sources = Some([upper, lower]);
            }
        }
        Ok(())
    }
}
