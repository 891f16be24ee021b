//! # Command manager
//!
//! Owner of a document's layers and both kinds of log. Tools commit content commands through it, the layer
//! panel adds, removes, and merges layers through it, and it tells observers whenever undo or redo becomes
//! available or unavailable.
//!
//! Lock order, to be followed by everything in the crate: the undo/redo operation lock, then the manager
//! state, then layer locks in ascending stacking position. A layer lock is never held while waiting on the
//! state lock. The observer list is locked before the state, and availability reads never wait on a layer.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::{
    bitmap::{Bitmap, BitmapError},
    commands::{
        structural::{AddLayer, MergeLayers, RemoveLayer},
        ContentCommand, LayerCommand, ReplayError, SnapshotCommand, StructuralError,
    },
    config::HistoryConfig,
    history::{structural::StructuralLog, LayerHistory},
    id::{Counter, LayerID, Stamp},
    io::{spill::SpillStorage, StorageError},
    layers::{Layer, LayerHandle, LayerSet},
    worker::{WorkerError, WorkerHandle},
};

/// Receives pushes whenever undo or redo availability changes.
/// Called with the observer list locked, so pushes arrive in the order the changes happened. An observer must
/// not subscribe or refresh from inside a push.
pub trait AvailabilityObserver: Send + Sync {
    fn on_undo_available(&self, available: bool);
    fn on_redo_available(&self, available: bool);
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Availability {
    pub undo: bool,
    pub redo: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("bad canvas size: {0}")]
    Canvas(#[from] BitmapError),
    #[error("spill storage unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to start history worker: {0}")]
    Worker(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum SpillError {
    #[error("{0} does not exist")]
    UnknownLayer(LayerID),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Direction {
    Undo,
    Redo,
}

/// Which log the next undo or redo comes from.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum Source {
    Structural,
    /// The active layer.
    Content,
}

#[derive(Debug)]
pub(crate) struct State {
    pub(crate) layers: LayerSet,
    pub(crate) structural: StructuralLog,
}
impl State {
    /// Pick the log holding the action to revert or reapply: undo takes the most recently executed action of
    /// the two, redo the most recently undone.
    pub(crate) fn choose(&self, active: &LayerHistory, direction: Direction) -> Option<Source> {
        let (content, structural) = match direction {
            Direction::Undo => (active.undo_stamp(), self.structural.undo_stamp()),
            Direction::Redo => (active.redo_stamp(), self.structural.redo_stamp()),
        };
        match (content, structural) {
            (None, None) => None,
            (Some(_), None) => Some(Source::Content),
            (None, Some(_)) => Some(Source::Structural),
            (Some(content), Some(structural)) => Some(if content > structural {
                Source::Content
            } else {
                Source::Structural
            }),
        }
    }
}

#[derive(Default)]
struct Observers {
    list: Vec<Arc<dyn AvailabilityObserver>>,
    last: Option<Availability>,
}

pub struct CommandManager {
    config: HistoryConfig,
    ids: Counter,
    state: Mutex<State>,
    storage: Arc<SpillStorage>,
    worker: WorkerHandle,
    observers: Mutex<Observers>,
}
impl std::fmt::Debug for CommandManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandManager")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
impl CommandManager {
    /// A document with a single blank layer, named "Background".
    /// # Errors
    /// If the canvas size is unusable, the spill directory can't be created, or the worker won't start.
    pub fn new(config: HistoryConfig) -> Result<Self, SetupError> {
        let worker = WorkerHandle::spawn()?;
        Self::with_worker(config, worker)
    }
    /// Like [`Self::new`], sharing an existing worker.
    /// # Errors
    /// See [`Self::new`].
    pub fn with_worker(config: HistoryConfig, worker: WorkerHandle) -> Result<Self, SetupError> {
        let bitmap = Bitmap::new(config.width, config.height)?;
        let storage = SpillStorage::new(config.spill_dir())?;
        let ids = Counter::default();

        let id = ids.next_layer();
        let layer = Layer::new(
            id,
            "Background".to_owned(),
            bitmap,
            LayerHistory::new(ids.next_stamp()),
        );
        log::info!(
            "New {}x{} document, spilling to {:?}",
            config.width,
            config.height,
            storage.dir()
        );
        Ok(Self {
            state: State {
                layers: LayerSet::new(id, Arc::new(layer.into())),
                structural: StructuralLog::default(),
            }
            .into(),
            config,
            ids,
            storage: Arc::new(storage),
            worker,
            observers: Mutex::default(),
        })
    }
    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }
    pub(crate) fn worker(&self) -> &WorkerHandle {
        &self.worker
    }
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }
    pub(crate) fn next_stamp(&self) -> Stamp {
        self.ids.next_stamp()
    }
    fn blank(&self) -> Bitmap {
        // Unwrap OK - the same dimensions were accepted in `with_worker`.
        Bitmap::new(self.config.width, self.config.height).unwrap()
    }
    /// Layers in the document, bottom first.
    #[must_use]
    pub fn layer_ids(&self) -> Vec<LayerID> {
        self.state.lock().layers.ids().to_vec()
    }
    #[must_use]
    pub fn active_layer(&self) -> LayerID {
        self.state.lock().layers.active()
    }
    /// # Errors
    /// If the layer is not part of the document.
    pub fn set_active_layer(&self, id: LayerID) -> Result<(), StructuralError> {
        let found = self.state.lock().layers.set_active(id);
        if !found {
            return Err(StructuralError::UnknownLayer(id));
        }
        self.refresh_availability();
        Ok(())
    }
    /// Handle to a layer currently in the document.
    #[must_use]
    pub fn layer(&self, id: LayerID) -> Option<LayerHandle> {
        self.state.lock().layers.get(id).cloned()
    }
    /// Apply a content command to a layer and record it.
    ///
    /// Blocks while an undo or redo of that layer is running. May spill the layer's history, waiting on the
    /// worker to do so. A failed spill is logged and retried later, the command is recorded regardless.
    /// # Errors
    /// If the layer doesn't exist or the command fails to apply. Nothing is recorded in that case.
    pub fn commit(
        &self,
        id: LayerID,
        content: Arc<dyn ContentCommand>,
    ) -> Result<Stamp, ReplayError> {
        let stamp = {
            let state = self.state.lock();
            let handle = state
                .layers
                .get(id)
                .cloned()
                .ok_or(ReplayError::UnknownLayer(id))?;
            let mut layer = handle.lock();
            drop(state);

            content.apply(&mut layer.bitmap)?;
            let stamp = self.ids.next_stamp();
            layer.history.record(stamp, LayerCommand::Content(content));

            if layer.history.needs_spill(&self.config.spill) {
                if let Err(e) = self.spill_locked(&mut layer) {
                    log::warn!("Failed to spill {id}, keeping history in memory: {e}");
                    layer.history.defer_spill(&self.config.spill);
                }
            }
            stamp
        };
        // A new action invalidates every structural redo.
        self.state.lock().structural.clear_redo();
        self.refresh_availability();
        Ok(stamp)
    }
    /// Snapshot the layer's current bitmap to storage and compact its log.
    fn spill_locked(&self, layer: &mut Layer) -> Result<(), SpillError> {
        let snapshot = Arc::new(SnapshotCommand::resident(layer.bitmap.clone()));
        let job = {
            let snapshot = snapshot.clone();
            let storage = self.storage.clone();
            move || snapshot.spill_to(&storage)
        };
        self.worker.run(job)??;
        log::debug!(
            "Spilled {} ({}), {} history entries released",
            layer.id(),
            layer.bitmap.digest().to_hex(),
            layer.history.executed().len()
        );
        layer.history.compact(snapshot);
        Ok(())
    }
    /// Spill a layer now, regardless of policy.
    /// # Errors
    /// If the layer doesn't exist or the spill fails, in which case the history is unchanged.
    pub fn spill_layer(&self, id: LayerID) -> Result<(), SpillError> {
        let state = self.state.lock();
        let handle = state
            .layers
            .get(id)
            .cloned()
            .ok_or(SpillError::UnknownLayer(id))?;
        let mut layer = handle.lock();
        drop(state);
        self.spill_locked(&mut layer)?;
        drop(layer);
        // Compaction leaves nothing to undo on this layer.
        self.refresh_availability();
        Ok(())
    }
    /// Add a blank layer above the active one, and make it active.
    pub fn add_layer(&self, name: impl Into<String>) -> LayerID {
        let id = {
            let mut state = self.state.lock();
            let id = self.ids.next_layer();
            let stamp = self.ids.next_stamp();
            let layer = Layer::new(id, name.into(), self.blank(), LayerHistory::new(stamp));

            let previous_active = state.layers.active();
            let position = state
                .layers
                .position(previous_active)
                .map_or(state.layers.len(), |position| position + 1);
            state.layers.insert(position, id, Arc::new(layer.into()));
            state.layers.set_active(id);
            state.structural.record(
                stamp,
                AddLayer {
                    layer: id,
                    position,
                    previous_active,
                    parked: None,
                }
                .into(),
            );
            id
        };
        log::debug!("Added {id}");
        self.refresh_availability();
        id
    }
    /// Remove a layer. It stays alive in the structural log, so removal can be undone.
    /// # Errors
    /// If the layer doesn't exist, or is the only one.
    pub fn remove_layer(&self, id: LayerID) -> Result<(), StructuralError> {
        {
            let mut state = self.state.lock();
            if !state.layers.contains(id) {
                return Err(StructuralError::UnknownLayer(id));
            }
            if state.layers.len() <= 1 {
                return Err(StructuralError::LastLayer);
            }
            let previous_active = state.layers.active();
            let (position, handle) = state
                .layers
                .take(id)
                .ok_or(StructuralError::UnknownLayer(id))?;
            let stamp = self.ids.next_stamp();
            state.structural.record(
                stamp,
                RemoveLayer {
                    layer: id,
                    position,
                    previous_active,
                    parked: Some(handle),
                }
                .into(),
            );
        }
        log::debug!("Removed {id}");
        self.refresh_availability();
        Ok(())
    }
    /// Composite a layer with the one directly below it into a new layer, placed where the lower of the two
    /// was. The new layer becomes active. Which is upper and which is lower is decided by stacking order, not
    /// argument order.
    /// # Errors
    /// If either layer doesn't exist, both are the same layer, they aren't neighbors, or their sizes differ.
    pub fn merge_layers(&self, a: LayerID, b: LayerID) -> Result<LayerID, StructuralError> {
        if a == b {
            return Err(StructuralError::SameLayer(a));
        }
        let merged = {
            let mut state = self.state.lock();
            let position_a = state
                .layers
                .position(a)
                .ok_or(StructuralError::UnknownLayer(a))?;
            let position_b = state
                .layers
                .position(b)
                .ok_or(StructuralError::UnknownLayer(b))?;
            let ((upper, upper_position), (lower, lower_position)) = if position_a > position_b {
                ((a, position_a), (b, position_b))
            } else {
                ((b, position_b), (a, position_a))
            };
            if upper_position != lower_position + 1 {
                return Err(StructuralError::NotAdjacent { upper, lower });
            }
            let (Some(upper_handle), Some(lower_handle)) = (
                state.layers.get(upper).cloned(),
                state.layers.get(lower).cloned(),
            ) else {
                return Err(StructuralError::MismatchedState);
            };

            let (bitmap, name) = {
                // Ascending position.
                let lower_layer = lower_handle.lock();
                let upper_layer = upper_handle.lock();
                let mut bitmap = lower_layer.bitmap.clone();
                bitmap
                    .composite(&upper_layer.bitmap)
                    .map_err(|_| StructuralError::Incompatible {
                        upper: upper_layer.bitmap.dimensions(),
                        lower: lower_layer.bitmap.dimensions(),
                    })?;
                (bitmap, lower_layer.name.clone())
            };

            let merged = self.ids.next_layer();
            let stamp = self.ids.next_stamp();
            let history = LayerHistory::from_snapshot(
                stamp,
                Arc::new(SnapshotCommand::resident(bitmap.clone())),
            );
            let layer = Layer::new(merged, name, bitmap, history);

            let previous_active = state.layers.active();
            state.layers.take(upper);
            state.layers.take(lower);
            state
                .layers
                .insert(lower_position, merged, Arc::new(layer.into()));
            state.layers.set_active(merged);
            state.structural.record(
                stamp,
                MergeLayers {
                    upper,
                    upper_position,
                    lower,
                    lower_position,
                    merged,
                    previous_active,
                    sources: Some([upper_handle, lower_handle]),
                    parked_merged: None,
                }
                .into(),
            );
            merged
        };
        log::debug!("Merged {a} and {b} into {merged}");
        self.refresh_availability();
        Ok(merged)
    }
    /// Every layer composited bottom to top.
    #[must_use]
    pub fn flatten(&self) -> Bitmap {
        let handles: Vec<_> = {
            let state = self.state.lock();
            state
                .layers
                .ids()
                .iter()
                .filter_map(|id| Some((*id, state.layers.get(*id)?.clone())))
                .collect()
        };
        let mut flat = self.blank();
        for (id, handle) in handles {
            // Same dimensions for every layer in a document.
            if let Err(e) = flat.composite(&handle.lock().bitmap) {
                log::warn!("Skipping {id} in flatten: {e}");
            }
        }
        flat
    }
    /// The active layer's flags are those it published when last unlocked, so a replay in progress reports
    /// the state from before it started.
    #[must_use]
    pub fn availability(&self) -> Availability {
        let state = self.state.lock();
        let (undo, redo) = state
            .layers
            .get(state.layers.active())
            .map(|handle| handle.published())
            .unwrap_or_default();
        Availability {
            undo: undo || !state.structural.executed().is_empty(),
            redo: redo || !state.structural.undone().is_empty(),
        }
    }
    /// Start receiving availability pushes. The observer is immediately told the current state.
    pub fn subscribe(&self, observer: Arc<dyn AvailabilityObserver>) {
        let mut observers = self.observers.lock();
        let current = self.availability();
        observers.last.get_or_insert(current);
        observers.list.push(observer.clone());
        observer.on_undo_available(current.undo);
        observer.on_redo_available(current.redo);
    }
    /// Recompute availability, pushing any change to observers.
    pub fn refresh_availability(&self) {
        // Read under the observer lock, so a slower refresh can't overwrite a newer state with an older one.
        let mut observers = self.observers.lock();
        let current = self.availability();
        let previous = observers.last.replace(current);
        if previous == Some(current) {
            return;
        }
        log::trace!("Availability now {current:?}");
        for observer in &observers.list {
            if previous.map(|p| p.undo) != Some(current.undo) {
                observer.on_undo_available(current.undo);
            }
            if previous.map(|p| p.redo) != Some(current.redo) {
                observer.on_redo_available(current.redo);
            }
        }
    }
}
