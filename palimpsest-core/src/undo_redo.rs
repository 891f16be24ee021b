//! # Undo and redo
//!
//! Drives one undo or redo from request to completion. Structural actions are reversed right away, under the
//! manager's lock. Content actions hold the active layer's lock while the worker replays it, so new commands
//! for that layer wait for the replay instead of landing in a half-rewound log.
//!
//! Invocations are serialized by an operation lock: a second request made while one is running waits its turn.
//! There is no cancellation and no coalescing of repeated requests.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::{Mutex, RwLock};

use crate::{
    commands::{Command, ReplayError, StructuralError},
    id::Stamp,
    layers::Layer,
    manager::{CommandManager, Direction, Source, State},
    viewport::SharedView,
    worker::WorkerError,
};

/// The UI collaborators notified around an operation. Every method defaults to doing nothing.
pub trait Frontend: Send + Sync {
    /// An operation that may take a while has started on the interactive thread.
    fn show_busy(&self) {}
    fn dismiss_busy(&self) {}
    /// Discard whatever the active tool was in the middle of, as the layer under it changed.
    fn reset_tool(&self) {}
    fn refresh_layers(&self) {}
    fn refresh_surface(&self) {}
}
/// A frontend with nobody watching.
#[derive(Copy, Clone, Debug, Default)]
pub struct Headless;
impl Frontend for Headless {}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Phase {
    /// No operation has run yet.
    #[default]
    Idle,
    Running,
    Done,
}

#[derive(Debug)]
pub enum Outcome {
    Undone(Command),
    Redone(Command),
    /// There was nothing to undo or redo.
    NoOp,
}
impl Outcome {
    fn new(direction: Direction, command: Command) -> Self {
        match direction {
            Direction::Undo => Self::Undone(command),
            Direction::Redo => Self::Redone(command),
        }
    }
    #[must_use]
    pub fn command(&self) -> Option<&Command> {
        match self {
            Self::Undone(c) | Self::Redone(c) => Some(c),
            Self::NoOp => None,
        }
    }
    #[must_use]
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }
}

/// Why an undo or redo failed. In every case the logs are as they were before the attempt.
#[derive(thiserror::Error, Debug)]
pub enum OperationError {
    /// Replay of the layer failed, including failure to read back a spilled snapshot.
    #[error("replay failed: {0}")]
    Replay(#[from] ReplayError),
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Dismisses the busy indicator when dropped, if it was shown.
struct Busy<'a>(Option<&'a dyn Frontend>);
impl<'a> Busy<'a> {
    fn show(frontend: &'a dyn Frontend, interactive: bool) -> Self {
        if interactive {
            frontend.show_busy();
            Self(Some(frontend))
        } else {
            Self(None)
        }
    }
}
impl Drop for Busy<'_> {
    fn drop(&mut self) {
        if let Some(frontend) = self.0.take() {
            frontend.dismiss_busy();
        }
    }
}

pub struct UndoRedoManager {
    commands: Arc<CommandManager>,
    frontend: Arc<dyn Frontend>,
    view: SharedView,
    operation: Mutex<()>,
    phase: RwLock<Phase>,
    dirty: AtomicBool,
    /// The thread that constructed us, taken to be the one the UI runs on.
    interactive: std::thread::ThreadId,
}
impl UndoRedoManager {
    /// Should be called from the interactive thread, which is the only one that gets a busy indicator.
    #[must_use]
    pub fn new(commands: Arc<CommandManager>, frontend: Arc<dyn Frontend>, view: SharedView) -> Self {
        Self {
            commands,
            frontend,
            view,
            operation: Mutex::new(()),
            phase: RwLock::new(Phase::Idle),
            dirty: AtomicBool::new(false),
            interactive: std::thread::current().id(),
        }
    }
    #[must_use]
    pub fn commands(&self) -> &Arc<CommandManager> {
        &self.commands
    }
    #[must_use]
    pub fn view(&self) -> &SharedView {
        &self.view
    }
    /// Phase of the latest operation.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }
    /// Has an undo or redo changed the document since it was last saved?
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
    pub fn mark_saved(&self) {
        self.dirty.store(false, Ordering::Release);
    }
    /// Revert the most recent action, structural or on the active layer.
    /// # Errors
    /// See [`OperationError`]. Having nothing to undo is not an error.
    pub fn perform_undo(&self) -> Result<Outcome, OperationError> {
        self.perform(Direction::Undo)
    }
    /// Reapply the most recently reverted action.
    /// # Errors
    /// See [`OperationError`]. Having nothing to redo is not an error.
    pub fn perform_redo(&self) -> Result<Outcome, OperationError> {
        self.perform(Direction::Redo)
    }
    fn perform(&self, direction: Direction) -> Result<Outcome, OperationError> {
        let result = {
            let _operation = self.operation.lock();
            *self.phase.write() = Phase::Running;
            let result = self.perform_locked(direction);
            *self.phase.write() = Phase::Done;
            result
        };
        // Including after failures and no-ops.
        self.commands.refresh_availability();

        match &result {
            Ok(Outcome::NoOp) => log::trace!("{direction:?}: nothing to do"),
            Ok(outcome) => log::debug!(
                "{direction:?}: {}",
                outcome.command().map_or("", Command::name)
            ),
            Err(e) => log::warn!("{direction:?} failed: {e}"),
        }
        result
    }
    fn perform_locked(&self, direction: Direction) -> Result<Outcome, OperationError> {
        let mut state = self.commands.lock_state();
        let active = state.layers.active();
        let handle = state
            .layers
            .get(active)
            .cloned()
            .ok_or(ReplayError::UnknownLayer(active))?;
        let mut layer = handle.lock();

        let Some(source) = state.choose(&layer.history, direction) else {
            return Ok(Outcome::NoOp);
        };
        let view = *self.view.read();
        let busy = Busy::show(
            self.frontend.as_ref(),
            std::thread::current().id() == self.interactive,
        );
        let result = match source {
            Source::Structural => {
                drop(layer);
                let now = self.commands.next_stamp();
                let result = Self::step_structural(&mut state, direction, now);
                drop(state);
                result.map_err(OperationError::from)
            }
            Source::Content => {
                // Keep the layer, let everyone else at the rest of the document.
                drop(state);
                self.step_content(&mut layer, direction)
            }
        };
        if let Ok(Some(_)) = &result {
            // The active layer, or what is under the tool, changed either way.
            self.frontend.reset_tool();
            self.frontend.refresh_layers();
            self.frontend.refresh_surface();
            self.dirty.store(true, Ordering::Release);
        }
        drop(busy);
        // Whatever the UI did to the camera meanwhile, undo doesn't move it.
        *self.view.write() = view;
        Ok(result?.map_or(Outcome::NoOp, |command| Outcome::new(direction, command)))
    }
    fn step_structural(
        state: &mut State,
        direction: Direction,
        now: Stamp,
    ) -> Result<Option<Command>, StructuralError> {
        let State { layers, structural } = state;
        let result = match direction {
            Direction::Undo => structural.undo(layers, now),
            Direction::Redo => structural.redo(layers),
        };
        match result {
            None => Ok(None),
            Some(result) => Ok(Some(result?.summary().into())),
        }
    }
    /// Replay the layer on the worker, installing the result or rolling the log back.
    fn step_content(
        &self,
        layer: &mut Layer,
        direction: Direction,
    ) -> Result<Option<Command>, OperationError> {
        // When the subject was undone, needed to put it back if redo fails.
        let undone_at = layer.history.redo_stamp();
        let replay = match direction {
            Direction::Undo => layer.history.begin_undo(self.commands.next_stamp()),
            Direction::Redo => layer.history.begin_redo(),
        };
        let replay = match replay {
            Ok(replay) => replay,
            Err(e) => {
                log::trace!("{e}");
                return Ok(None);
            }
        };
        let command = Command::Layer {
            target: layer.id(),
            command: replay.subject().command.clone(),
        };

        let canvas = layer.bitmap.clone();
        let result = match self.commands.worker().run(move || replay.run(canvas)) {
            Ok(Ok(bitmap)) => Ok(bitmap),
            Ok(Err(e)) => Err(OperationError::from(e)),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(bitmap) => {
                layer.bitmap = bitmap;
                Ok(Some(command))
            }
            Err(e) => {
                match direction {
                    Direction::Undo => layer.history.rollback_undo(),
                    Direction::Redo => layer
                        .history
                        .rollback_redo(undone_at.unwrap_or(Stamp::ZERO)),
                }
                Err(e)
            }
        }
    }
}
