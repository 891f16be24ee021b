//! # Spill storage
//!
//! Where snapshot bitmaps go when they leave memory. Each spill is its own file, owned by a [`SpillFile`]
//! handle, and the file is deleted when the handle drops - that is, when the snapshot referencing it is
//! superseded by a later spill or the layer holding it is destroyed.

use std::path::{Path, PathBuf};

use super::StorageError;
use crate::bitmap::Bitmap;

/// A directory that spill files are written into.
#[derive(Debug)]
pub struct SpillStorage {
    dir: PathBuf,
}
impl SpillStorage {
    /// Use `dir` for spill files, creating it if needed.
    /// # Errors
    /// If the directory can't be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        log::debug!("Spilling bitmaps to {dir:?}");
        Ok(Self { dir })
    }
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
    /// Serialize the bitmap to a fresh file.
    /// # Errors
    /// On any IO or encoding failure. No file is left behind in that case.
    pub fn write(&self, bitmap: &Bitmap) -> Result<SpillFile, StorageError> {
        let path = self.dir.join(format!("{}.png", uuid::Uuid::new_v4()));

        let try_write = || -> Result<u64, StorageError> {
            let file = std::fs::File::create_new(&path)?;
            let mut writer = std::io::BufWriter::new(file);
            super::write_png(bitmap, &mut writer)?;
            let file = writer.into_inner().map_err(std::io::IntoInnerError::into_error)?;
            file.sync_data()?;
            Ok(file.metadata()?.len())
        };

        match try_write() {
            Ok(len) => {
                log::debug!(
                    "Spilled {}x{} bitmap ({} in memory) to {} file {path:?}",
                    bitmap.width(),
                    bitmap.height(),
                    human_bytes::human_bytes(bitmap.byte_len() as f64),
                    human_bytes::human_bytes(len as f64),
                );
                Ok(SpillFile {
                    path,
                    dimensions: bitmap.dimensions(),
                    len,
                })
            }
            Err(e) => {
                // Partial file is useless. Ignore errors, it may not have been created at all.
                let _ = std::fs::remove_file(&path);
                Err(e)
            }
        }
    }
}

/// Owning handle to one spilled bitmap. Dropping it deletes the file.
#[derive(Debug)]
pub struct SpillFile {
    path: PathBuf,
    dimensions: (u32, u32),
    len: u64,
}
impl SpillFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// Size of the file on disk.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }
    /// Load the bitmap back.
    /// # Errors
    /// If the file is gone, unreadable, or no longer holds the image that was written.
    pub fn read(&self) -> Result<Bitmap, StorageError> {
        let file = std::fs::File::open(&self.path)?;
        let bitmap = super::read_png(std::io::BufReader::new(file))?;
        if bitmap.dimensions() != self.dimensions {
            return Err(StorageError::Mismatch(format!(
                "{:?} holds a {:?} image, expected {:?}",
                self.path,
                bitmap.dimensions(),
                self.dimensions
            )));
        }
        Ok(bitmap)
    }
}
impl Drop for SpillFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::trace!("Released spill file {:?}", self.path),
            Err(e) => log::warn!("Failed to delete spill file {:?}: {e}", self.path),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitmap::Rgba8;

    #[test]
    fn write_read_release() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SpillStorage::new(dir.path().join("spill")).unwrap();

        let mut bitmap = Bitmap::new(16, 9).unwrap();
        bitmap.blend(3, 4, Rgba8::new(10, 20, 30, 40));

        let file = storage.write(&bitmap).unwrap();
        let path = file.path().to_owned();
        assert!(path.exists());
        assert!(!file.is_empty(), "there is nothing in the bitmap file");
        assert_eq!(file.read().unwrap(), bitmap);

        drop(file);
        assert!(!path.exists(), "spill file outlived its handle");
    }
    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SpillStorage::new(dir.path()).unwrap();
        let file = storage.write(&Bitmap::new(2, 2).unwrap()).unwrap();
        std::fs::remove_file(file.path()).unwrap();
        assert!(matches!(file.read(), Err(StorageError::Io(_))));
    }
    #[test]
    fn unwritable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SpillStorage::new(dir.path().join("gone")).unwrap();
        std::fs::remove_dir(storage.dir()).unwrap();
        assert!(storage.write(&Bitmap::new(2, 2).unwrap()).is_err());
    }
}
