//! # History
//!
//! Per-layer command logs. A layer's bitmap is always exactly what you get by taking a blank bitmap and
//! applying its executed log in order, so undo is "drop the last command and replay", and redo is
//! "apply the command again".
//!
//! Replays are split into a `begin_*` step, which moves the command between stacks and returns a detached
//! [`Replay`], and a matching `rollback_*` step for when the replay fails. The replay itself owns everything
//! it needs and can be shipped off to the worker while the caller keeps the layer locked.

pub mod structural;

use std::sync::Arc;

use crate::{
    bitmap::Bitmap,
    commands::{HistoryError, LayerCommand, ReplayError, SnapshotCommand},
    config::SpillPolicy,
    id::Stamp,
};

#[derive(Clone, Debug)]
pub struct Entry {
    pub stamp: Stamp,
    pub command: LayerCommand,
}

/// Something on an undo stack, and when it was put there.
///
/// Redo takes whichever log was undone most recently, which original stamps can't tell: a layer's undone
/// commands survive structural changes made after they were undone.
#[derive(Clone, Debug)]
pub struct Undone<T> {
    pub at: Stamp,
    pub item: T,
}

/// The failure modes of a complete synchronous undo or redo step.
#[derive(thiserror::Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

#[derive(Debug)]
enum ReplayKind {
    /// Starting from a base entry, apply everything.
    Rebuild(Vec<LayerCommand>),
    /// Apply one command on top of the current state.
    Apply(LayerCommand),
}

/// A detached unit of replay work.
#[derive(Debug)]
pub struct Replay {
    kind: ReplayKind,
    /// The command that was undone or redone.
    subject: Entry,
}
impl Replay {
    /// The command this replay undoes or redoes.
    #[must_use]
    pub fn subject(&self) -> &Entry {
        &self.subject
    }
    /// Produce the new bitmap, given a copy of the current one.
    /// # Errors
    /// Any command failing to apply aborts the replay.
    pub fn run(self, mut canvas: Bitmap) -> Result<Bitmap, ReplayError> {
        match self.kind {
            ReplayKind::Rebuild(commands) => {
                // Every rebuild starts at a base entry, which overwrites the whole canvas.
                // Clear anyway, so a base that forgets to isn't silently building on stale pixels.
                canvas.clear();
                for command in &commands {
                    log::trace!("Replaying {}", command.name());
                    command.apply(&mut canvas)?;
                }
                log::debug!(
                    "Rebuilt {}x{} layer from {} commands, digest {}",
                    canvas.width(),
                    canvas.height(),
                    commands.len(),
                    canvas.digest().to_hex(),
                );
            }
            ReplayKind::Apply(command) => {
                log::trace!("Reapplying {}", command.name());
                command.apply(&mut canvas)?;
            }
        }
        Ok(canvas)
    }
}

/// The log of one layer.
#[derive(Debug)]
pub struct LayerHistory {
    /// Never empty, the first entry is always a base (`Init` or `Snapshot`).
    executed: Vec<Entry>,
    /// Top of stack is the last element.
    undone: Vec<Undone<Entry>>,
    /// Records left to wait before trying to spill again, after a failure.
    spill_backoff: usize,
}
impl LayerHistory {
    /// History of a blank layer.
    #[must_use]
    pub fn new(stamp: Stamp) -> Self {
        Self::with_base(Entry {
            stamp,
            command: LayerCommand::Init,
        })
    }
    /// History of a layer that starts out with the given pixels.
    #[must_use]
    pub fn from_snapshot(stamp: Stamp, snapshot: Arc<SnapshotCommand>) -> Self {
        Self::with_base(Entry {
            stamp,
            command: LayerCommand::Snapshot(snapshot),
        })
    }
    fn with_base(base: Entry) -> Self {
        debug_assert!(base.command.is_base());
        Self {
            executed: vec![base],
            undone: Vec::new(),
            spill_backoff: 0,
        }
    }
    #[must_use]
    pub fn executed(&self) -> &[Entry] {
        &self.executed
    }
    /// Undone commands, in the order they were undone.
    #[must_use]
    pub fn undone(&self) -> &[Undone<Entry>] {
        &self.undone
    }
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.executed.len() > 1
    }
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }
    /// Stamp of the command an undo would revert.
    #[must_use]
    pub fn undo_stamp(&self) -> Option<Stamp> {
        self.can_undo()
            .then(|| self.executed.last().map(|entry| entry.stamp))
            .flatten()
    }
    /// When the command a redo would reapply was undone.
    #[must_use]
    pub fn redo_stamp(&self) -> Option<Stamp> {
        self.undone.last().map(|undone| undone.at)
    }
    /// Append a newly executed command. Anything undone can no longer be redone.
    pub fn record(&mut self, stamp: Stamp, command: LayerCommand) {
        log::trace!("Recording {} at {stamp:?}", command.name());
        self.executed.push(Entry { stamp, command });
        self.undone.clear();
        self.spill_backoff = self.spill_backoff.saturating_sub(1);
    }
    /// Move the last executed command to the undo stack, returning the replay that rebuilds the layer without it.
    /// `at` is the time of the undo.
    /// # Errors
    /// [`HistoryError::EmptyHistory`] if only the base entry is left. Nothing is changed.
    pub fn begin_undo(&mut self, at: Stamp) -> Result<Replay, HistoryError> {
        if !self.can_undo() {
            return Err(HistoryError::EmptyHistory);
        }
        // Checked len > 1 above
        let subject = self.executed.pop().ok_or(HistoryError::EmptyHistory)?;
        let base = self
            .executed
            .iter()
            .rposition(|entry| entry.command.is_base())
            .unwrap_or(0);
        let commands = self.executed[base..]
            .iter()
            .map(|entry| entry.command.clone())
            .collect();
        self.undone.push(Undone {
            at,
            item: subject.clone(),
        });
        Ok(Replay {
            kind: ReplayKind::Rebuild(commands),
            subject,
        })
    }
    /// Undo a [`Self::begin_undo`] whose replay failed.
    pub fn rollback_undo(&mut self) {
        if let Some(undone) = self.undone.pop() {
            self.executed.push(undone.item);
        }
    }
    /// Move the top of the undo stack back to the executed log, returning the replay that reapplies it.
    /// # Errors
    /// [`HistoryError::EmptyRedo`] if nothing is undone. Nothing is changed.
    pub fn begin_redo(&mut self) -> Result<Replay, HistoryError> {
        let subject = self.undone.pop().ok_or(HistoryError::EmptyRedo)?.item;
        self.executed.push(subject.clone());
        Ok(Replay {
            kind: ReplayKind::Apply(subject.command.clone()),
            subject,
        })
    }
    /// Undo a [`Self::begin_redo`] whose replay failed. `at` must be the time it was originally undone.
    pub fn rollback_redo(&mut self, at: Stamp) {
        // Never pop the base.
        if self.executed.len() > 1 {
            if let Some(item) = self.executed.pop() {
                self.undone.push(Undone { at, item });
            }
        }
    }
    /// Undo one command in place, on the calling thread.
    /// # Errors
    /// On error, both the log and `bitmap` are left as they were.
    pub fn undo_one(&mut self, bitmap: &mut Bitmap, at: Stamp) -> Result<(), StepError> {
        let replay = self.begin_undo(at)?;
        match replay.run(bitmap.clone()) {
            Ok(replayed) => {
                *bitmap = replayed;
                Ok(())
            }
            Err(e) => {
                self.rollback_undo();
                Err(e.into())
            }
        }
    }
    /// Redo one command in place, on the calling thread.
    /// # Errors
    /// On error, both the log and `bitmap` are left as they were.
    pub fn redo_one(&mut self, bitmap: &mut Bitmap) -> Result<(), StepError> {
        let at = self.redo_stamp();
        let replay = self.begin_redo()?;
        match replay.run(bitmap.clone()) {
            Ok(replayed) => {
                *bitmap = replayed;
                Ok(())
            }
            Err(e) => {
                // Begin succeeded, so there was something undone.
                self.rollback_redo(at.unwrap_or(Stamp::ZERO));
                Err(e.into())
            }
        }
    }
    /// Approximate memory held by executed commands.
    #[must_use]
    pub fn footprint(&self) -> usize {
        self.executed
            .iter()
            .map(|entry| entry.command.footprint())
            .sum()
    }
    /// Should the executed log be compacted into a snapshot?
    #[must_use]
    pub fn needs_spill(&self, policy: &SpillPolicy) -> bool {
        if self.spill_backoff > 0 {
            return false;
        }
        // A lone spilled snapshot is as compact as it gets.
        let already_compact = self.executed.len() == 1
            && self.executed[0]
                .command
                .snapshot()
                .is_some_and(|snapshot| snapshot.is_spilled());
        !already_compact
            && (self.executed.len() > policy.max_commands || self.footprint() > policy.max_bytes)
    }
    /// A spill failed, don't try again for a while.
    pub fn defer_spill(&mut self, policy: &SpillPolicy) {
        self.spill_backoff = policy.retry_after;
    }
    /// Replace the executed log with a snapshot of the current bitmap. The undo stack is untouched.
    ///
    /// `snapshot` must hold exactly the pixels the executed log produces.
    pub fn compact(&mut self, snapshot: Arc<SnapshotCommand>) {
        // Never empty.
        let stamp = self.executed.last().map_or(Stamp::ZERO, |entry| entry.stamp);
        let dropped = self.executed.len();
        self.executed = vec![Entry {
            stamp,
            command: LayerCommand::Snapshot(snapshot),
        }];
        self.spill_backoff = 0;
        log::debug!("Compacted {dropped} commands into a snapshot");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        bitmap::Rgba8,
        commands::{paint, ContentCommand},
        id::Counter,
    };

    const RED: Rgba8 = Rgba8::new(255, 0, 0, 255);
    const GREEN: Rgba8 = Rgba8::new(0, 255, 0, 255);

    fn rect(x: u32, color: Rgba8) -> LayerCommand {
        let command: Arc<dyn ContentCommand> = Arc::new(paint::FillRect {
            x,
            y: 0,
            width: 2,
            height: 2,
            color,
        });
        command.into()
    }
    /// Apply + record, the way the manager commits.
    fn commit(history: &mut LayerHistory, bitmap: &mut Bitmap, counter: &Counter, command: LayerCommand) {
        command.apply(bitmap).unwrap();
        history.record(counter.next_stamp(), command);
    }

    /// Init, A, B: undo gives the state after A, undo again gives blank, a third undo is refused.
    #[test]
    fn init_a_b() {
        let counter = Counter::default();
        let mut history = LayerHistory::new(counter.next_stamp());
        let mut bitmap = Bitmap::new(4, 2).unwrap();
        let blank = bitmap.clone();

        commit(&mut history, &mut bitmap, &counter, rect(0, RED));
        let after_a = bitmap.clone();
        commit(&mut history, &mut bitmap, &counter, rect(2, GREEN));
        let after_b = bitmap.clone();

        history.undo_one(&mut bitmap, counter.next_stamp()).unwrap();
        assert_eq!(bitmap, after_a);
        assert_eq!(history.executed().len(), 2);
        assert_eq!(history.undone().len(), 1);

        history.undo_one(&mut bitmap, counter.next_stamp()).unwrap();
        assert_eq!(bitmap, blank);
        assert!(!history.can_undo());
        assert!(matches!(
            history.undo_one(&mut bitmap, counter.next_stamp()),
            Err(StepError::History(HistoryError::EmptyHistory))
        ));

        history.redo_one(&mut bitmap).unwrap();
        history.redo_one(&mut bitmap).unwrap();
        assert_eq!(bitmap, after_b);
        assert!(matches!(
            history.redo_one(&mut bitmap),
            Err(StepError::History(HistoryError::EmptyRedo))
        ));
    }
    #[test]
    fn record_clears_redo() {
        let counter = Counter::default();
        let mut history = LayerHistory::new(counter.next_stamp());
        let mut bitmap = Bitmap::new(4, 2).unwrap();
        commit(&mut history, &mut bitmap, &counter, rect(0, RED));
        history.undo_one(&mut bitmap, counter.next_stamp()).unwrap();
        assert!(history.can_redo());
        commit(&mut history, &mut bitmap, &counter, rect(2, GREEN));
        assert!(!history.can_redo());
    }
    #[test]
    fn stamps() {
        let counter = Counter::default();
        let mut history = LayerHistory::new(counter.next_stamp());
        assert_eq!(history.undo_stamp(), None);
        let mut bitmap = Bitmap::new(4, 2).unwrap();
        commit(&mut history, &mut bitmap, &counter, rect(0, RED));
        let a = history.undo_stamp().unwrap();
        commit(&mut history, &mut bitmap, &counter, rect(2, RED));
        let b = history.undo_stamp().unwrap();
        assert!(a < b);
        let at = counter.next_stamp();
        history.undo_one(&mut bitmap, at).unwrap();
        assert_eq!(history.redo_stamp(), Some(at));
        assert_eq!(history.undone()[0].item.stamp, b);
        assert_eq!(history.undo_stamp(), Some(a));
    }

    #[derive(Debug)]
    struct Refuses;
    impl ContentCommand for Refuses {
        fn apply(&self, target: &mut Bitmap) -> Result<(), ReplayError> {
            Err(ReplayError::Incompatible {
                expected: (0, 0),
                found: target.dimensions(),
            })
        }
        fn name(&self) -> &str {
            "Refuses"
        }
    }
    #[test]
    fn failed_replay_rolls_back() {
        let counter = Counter::default();
        let mut history = LayerHistory::new(counter.next_stamp());
        let mut bitmap = Bitmap::new(4, 2).unwrap();
        // Recorded without applying, so it only fails on replay.
        history.record(counter.next_stamp(), LayerCommand::Content(Arc::new(Refuses)));
        commit(&mut history, &mut bitmap, &counter, rect(0, RED));
        let before = bitmap.clone();

        assert!(matches!(
            history.undo_one(&mut bitmap, counter.next_stamp()),
            Err(StepError::Replay(_))
        ));
        assert_eq!(bitmap, before);
        assert_eq!(history.executed().len(), 3);
        assert!(history.undone().is_empty());
    }
    #[test]
    fn spill_threshold() {
        let policy = SpillPolicy {
            max_commands: 3,
            max_bytes: usize::MAX,
            retry_after: 2,
        };
        let counter = Counter::default();
        let mut history = LayerHistory::new(counter.next_stamp());
        let mut bitmap = Bitmap::new(4, 2).unwrap();
        commit(&mut history, &mut bitmap, &counter, rect(0, RED));
        commit(&mut history, &mut bitmap, &counter, rect(1, RED));
        assert!(!history.needs_spill(&policy));
        commit(&mut history, &mut bitmap, &counter, rect(2, RED));
        assert!(history.needs_spill(&policy));

        history.defer_spill(&policy);
        assert!(!history.needs_spill(&policy));
        commit(&mut history, &mut bitmap, &counter, rect(0, GREEN));
        assert!(!history.needs_spill(&policy));
        commit(&mut history, &mut bitmap, &counter, rect(1, GREEN));
        assert!(history.needs_spill(&policy), "should retry after backoff");
    }
    #[test]
    fn compacted_equivalent() {
        let counter = Counter::default();
        let mut history = LayerHistory::new(counter.next_stamp());
        let mut bitmap = Bitmap::new(4, 2).unwrap();
        commit(&mut history, &mut bitmap, &counter, rect(0, RED));
        commit(&mut history, &mut bitmap, &counter, rect(1, GREEN));
        let compacted = bitmap.clone();
        let last = history.undo_stamp();
        history.compact(Arc::new(SnapshotCommand::resident(bitmap.clone())));
        assert_eq!(history.executed().len(), 1);
        assert_eq!(history.executed()[0].stamp, last.unwrap());
        assert!(!history.can_undo(), "undo must not go below a snapshot");

        commit(&mut history, &mut bitmap, &counter, rect(2, RED));
        history.undo_one(&mut bitmap, counter.next_stamp()).unwrap();
        assert_eq!(bitmap, compacted);
        history.redo_one(&mut bitmap).unwrap();
        let mut expected = compacted.clone();
        rect(2, RED).apply(&mut expected).unwrap();
        assert_eq!(bitmap, expected);
    }
}
