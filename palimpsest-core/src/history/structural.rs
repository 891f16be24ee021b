//! # Structural log
//!
//! The document-wide log of layer additions, removals, and merges. Shares its stamps with the layer logs, so
//! that undo can tell which of the two holds the most recent action.

use super::Undone;
use crate::{
    commands::{StructuralCommand, StructuralError},
    id::Stamp,
    layers::LayerSet,
};

#[derive(Debug, Default)]
pub struct StructuralLog {
    executed: Vec<(Stamp, StructuralCommand)>,
    /// Top of stack is the last element.
    undone: Vec<Undone<(Stamp, StructuralCommand)>>,
}
impl StructuralLog {
    #[must_use]
    pub fn executed(&self) -> &[(Stamp, StructuralCommand)] {
        &self.executed
    }
    #[must_use]
    pub fn undone(&self) -> &[Undone<(Stamp, StructuralCommand)>] {
        &self.undone
    }
    #[must_use]
    pub fn undo_stamp(&self) -> Option<Stamp> {
        self.executed.last().map(|(stamp, _)| *stamp)
    }
    /// When the command a redo would reapply was undone.
    #[must_use]
    pub fn redo_stamp(&self) -> Option<Stamp> {
        self.undone.last().map(|undone| undone.at)
    }
    /// Record an already-performed command. Clears the redo stack.
    pub fn record(&mut self, stamp: Stamp, command: StructuralCommand) {
        log::trace!("Recording {} at {stamp:?}", command.kind().as_ref());
        self.executed.push((stamp, command));
        self.clear_redo();
    }
    /// Forget everything undone. Layers parked by undone additions and merges are dropped here.
    pub fn clear_redo(&mut self) {
        self.undone.clear();
    }
    /// Reverse the most recent command, `at` being the time of the undo. `None` if there is nothing to undo.
    /// # Errors
    /// See [`StructuralCommand::undo`]. On error the log is unchanged.
    pub fn undo(
        &mut self,
        layers: &mut LayerSet,
        at: Stamp,
    ) -> Option<Result<&StructuralCommand, StructuralError>> {
        let (stamp, mut command) = self.executed.pop()?;
        if let Err(e) = command.undo(layers) {
            self.executed.push((stamp, command));
            return Some(Err(e));
        }
        self.undone.push(Undone {
            at,
            item: (stamp, command),
        });
        self.undone.last().map(|undone| Ok(&undone.item.1))
    }
    /// Re-apply the most recently undone command. `None` if there is nothing to redo.
    /// # Errors
    /// See [`StructuralCommand::redo`]. On error the log is unchanged.
    pub fn redo(
        &mut self,
        layers: &mut LayerSet,
    ) -> Option<Result<&StructuralCommand, StructuralError>> {
        let Undone {
            at,
            item: (stamp, mut command),
        } = self.undone.pop()?;
        if let Err(e) = command.redo(layers) {
            self.undone.push(Undone {
                at,
                item: (stamp, command),
            });
            return Some(Err(e));
        }
        self.executed.push((stamp, command));
        self.executed.last().map(|(_, command)| Ok(command))
    }
}
