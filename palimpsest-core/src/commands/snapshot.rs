//! # Snapshots
//!
//! A snapshot is inserted by the engine, never by tools. It is created holding a bitmap in memory, and may
//! later move that bitmap out to a spill file. Either way it loads the same pixels.

use crate::{
    bitmap::Bitmap,
    io::{
        spill::{SpillFile, SpillStorage},
        StorageError,
    },
};

use super::ReplayError;

#[derive(Debug)]
enum SnapshotState {
    Resident(Bitmap),
    Spilled(SpillFile),
}

#[derive(Debug)]
pub struct SnapshotCommand {
    dimensions: (u32, u32),
    state: parking_lot::Mutex<SnapshotState>,
}
impl SnapshotCommand {
    #[must_use]
    pub fn resident(bitmap: Bitmap) -> Self {
        Self {
            dimensions: bitmap.dimensions(),
            state: SnapshotState::Resident(bitmap).into(),
        }
    }
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }
    #[must_use]
    pub fn is_spilled(&self) -> bool {
        matches!(*self.state.lock(), SnapshotState::Spilled(_))
    }
    /// Write the bitmap out to storage and release the in-memory copy.
    /// Does nothing if already spilled.
    /// # Errors
    /// If writing fails. The snapshot stays resident in that case.
    pub fn spill_to(&self, storage: &SpillStorage) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if let SnapshotState::Resident(bitmap) = &*state {
            let file = storage.write(bitmap)?;
            *state = SnapshotState::Spilled(file);
        }
        Ok(())
    }
    /// Overwrite `target` with the snapshot.
    /// # Errors
    /// If `target` is the wrong size, or the spill file can't be read back.
    pub fn apply(&self, target: &mut Bitmap) -> Result<(), ReplayError> {
        target.check_compatible(self.dimensions.0, self.dimensions.1)?;
        match &*self.state.lock() {
            SnapshotState::Resident(bitmap) => target.copy_from(bitmap),
            SnapshotState::Spilled(file) => {
                let bitmap = file.read()?;
                target.copy_from(&bitmap)
            }
        }
    }
    /// Memory held by the snapshot.
    #[must_use]
    pub fn footprint(&self) -> usize {
        match &*self.state.lock() {
            SnapshotState::Resident(bitmap) => bitmap.byte_len(),
            SnapshotState::Spilled(_) => std::mem::size_of::<SpillFile>(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitmap::Rgba8;
    #[test]
    fn spilled_loads_same() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SpillStorage::new(dir.path()).unwrap();

        let mut bitmap = Bitmap::new(8, 8).unwrap();
        bitmap.blend(5, 2, Rgba8::new(9, 8, 7, 200));
        let snapshot = SnapshotCommand::resident(bitmap.clone());
        let resident_footprint = snapshot.footprint();

        snapshot.spill_to(&storage).unwrap();
        assert!(snapshot.is_spilled());
        assert!(snapshot.footprint() < resident_footprint);
        // Again is fine.
        snapshot.spill_to(&storage).unwrap();

        let mut target = Bitmap::new(8, 8).unwrap();
        target.blend(0, 0, Rgba8::WHITE);
        snapshot.apply(&mut target).unwrap();
        assert_eq!(target, bitmap);
    }
    #[test]
    fn releases_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SpillStorage::new(dir.path()).unwrap();
        let snapshot = SnapshotCommand::resident(Bitmap::new(2, 2).unwrap());
        snapshot.spill_to(&storage).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        drop(snapshot);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
    #[test]
    fn wrong_size() {
        let snapshot = SnapshotCommand::resident(Bitmap::new(2, 2).unwrap());
        let mut target = Bitmap::new(3, 2).unwrap();
        assert!(matches!(
            snapshot.apply(&mut target),
            Err(ReplayError::Incompatible { .. })
        ));
    }
}
