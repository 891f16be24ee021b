//! # Commands
//!
//! Commands are the only way layers change. Every edit to a layer's pixels is a [`LayerCommand`] recorded in
//! that layer's [`crate::history::LayerHistory`], and every change to the set of layers itself is a
//! [`StructuralCommand`] recorded in the [`crate::history::structural::StructuralLog`].
//!
//! Undo never runs a command backwards. Instead, the layer is replayed from the start of its log, which is why
//! every command must be a pure function of the bitmap it is applied to.

pub mod paint;
pub mod snapshot;
pub mod structural;

use std::sync::Arc;

pub use snapshot::SnapshotCommand;
pub use structural::{StructuralCommand, StructuralError, StructuralKind};

use crate::{bitmap::Bitmap, id::LayerID, io::StorageError};

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error("bitmap is {found:?}, expected {expected:?}")]
    Incompatible {
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("{0} does not exist")]
    UnknownLayer(LayerID),
    #[error("failed to load snapshot: {0}")]
    Storage(#[from] StorageError),
}

/// Nothing to undo or redo. Not a failure, the corresponding control is simply disabled.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    #[error("nothing to undo")]
    EmptyHistory,
    #[error("nothing to redo")]
    EmptyRedo,
}

/// A deterministic edit to one layer's pixels. This is the interface drawing tools implement.
pub trait ContentCommand: Send + Sync + std::fmt::Debug {
    /// Apply the edit to `target`. Given equal bitmaps, must always produce equal results.
    /// If this generates an error, `target` should *not* be observably changed.
    /// # Errors
    /// If `target` is not something this command can be applied to.
    fn apply(&self, target: &mut Bitmap) -> Result<(), ReplayError>;
    /// Approximate heap size held by this command, used to decide when to spill.
    fn footprint(&self) -> usize {
        std::mem::size_of_val(self)
    }
    /// Short human-readable name, for logs.
    fn name(&self) -> &str;
}

/// An entry in one layer's log.
#[derive(Clone, Debug)]
pub enum LayerCommand {
    /// The initial state of a blank layer. Replays as a clear to transparent.
    Init,
    Content(Arc<dyn ContentCommand>),
    /// A complete bitmap, standing in for every command before it.
    Snapshot(Arc<SnapshotCommand>),
}
impl LayerCommand {
    /// Does this command replace the whole bitmap, so that replay can start here?
    #[must_use]
    pub fn is_base(&self) -> bool {
        match self {
            Self::Init | Self::Snapshot(_) => true,
            Self::Content(_) => false,
        }
    }
    /// # Errors
    /// See [`ContentCommand::apply`].
    pub fn apply(&self, target: &mut Bitmap) -> Result<(), ReplayError> {
        match self {
            Self::Init => {
                target.clear();
                Ok(())
            }
            Self::Content(content) => content.apply(target),
            Self::Snapshot(snapshot) => snapshot.apply(target),
        }
    }
    #[must_use]
    pub fn footprint(&self) -> usize {
        match self {
            Self::Init => 0,
            Self::Content(content) => content.footprint(),
            Self::Snapshot(snapshot) => snapshot.footprint(),
        }
    }
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Init => "Init",
            Self::Content(content) => content.name(),
            Self::Snapshot(_) => "Snapshot",
        }
    }
    #[must_use]
    pub fn content(&self) -> Option<&Arc<dyn ContentCommand>> {
        match self {
            Self::Content(c) => Some(c),
            _ => None,
        }
    }
    #[must_use]
    pub fn snapshot(&self) -> Option<&Arc<SnapshotCommand>> {
        match self {
            Self::Snapshot(s) => Some(s),
            _ => None,
        }
    }
}
impl From<Arc<dyn ContentCommand>> for LayerCommand {
    fn from(value: Arc<dyn ContentCommand>) -> Self {
        Self::Content(value)
    }
}
impl From<Arc<SnapshotCommand>> for LayerCommand {
    fn from(value: Arc<SnapshotCommand>) -> Self {
        Self::Snapshot(value)
    }
}

/// Description of a structural command, without the layers it may be holding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructuralSummary {
    pub kind: StructuralKind,
    /// The layers involved, in the order `[subject]` for add and remove, `[upper, lower, merged]` for merge.
    pub layers: smallvec::SmallVec<[LayerID; 3]>,
}

/// Any recorded action, as reported back by undo and redo.
#[derive(Clone, Debug)]
pub enum Command {
    Layer {
        target: LayerID,
        command: LayerCommand,
    },
    Structural(StructuralSummary),
}
impl From<StructuralSummary> for Command {
    fn from(value: StructuralSummary) -> Self {
        Self::Structural(value)
    }
}
impl Command {
    #[must_use]
    pub fn layer(&self) -> Option<(LayerID, &LayerCommand)> {
        match self {
            Self::Layer { target, command } => Some((*target, command)),
            Self::Structural(_) => None,
        }
    }
    #[must_use]
    pub fn structural(&self) -> Option<&StructuralSummary> {
        match self {
            Self::Structural(s) => Some(s),
            Self::Layer { .. } => None,
        }
    }
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Layer { command, .. } => command.name(),
            Self::Structural(s) => s.kind.as_ref(),
        }
    }
}
