//! Single-slot persistence for the parked location.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::fix::SavedLocation;

/// Last write wins; there is only ever one saved location.
pub trait LocationStore {
    fn save(&self, location: &SavedLocation) -> Result<()>;

    /// A missing or unreadable record both read as `None`.
    fn load(&self) -> Option<SavedLocation>;

    fn clear(&self) -> Result<()>;
}

fn encode(location: &SavedLocation) -> Result<String> {
    serde_json::to_string(location).map_err(|e| Error::StorageWrite(e.to_string()))
}

fn decode(content: &str) -> Result<SavedLocation> {
    let location: SavedLocation =
        serde_json::from_str(content).map_err(|e| Error::StorageReadCorrupt(e.to_string()))?;
    if !location.coordinate().is_valid() {
        return Err(Error::StorageReadCorrupt(format!(
            "coordinate out of range: {}",
            location.coordinate()
        )));
    }
    Ok(location)
}

/// Stores the record as JSON in a file, `~/.config/car-finder/location.json` by default.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocationStore for JsonFileStore {
    fn save(&self, location: &SavedLocation) -> Result<()> {
        let content = encode(location)?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::StorageWrite(e.to_string()))?;
        }

        // write aside then rename so a crash never leaves half a record
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| Error::StorageWrite(e.to_string()))?;
        debug!("Saved location to {:?}", self.path);
        Ok(())
    }

    fn load(&self) -> Option<SavedLocation> {
        trace!("Reading {:?}", self.path);
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Can not read {:?}: {}", self.path, e);
                return None;
            }
        };

        match decode(&content) {
            Ok(location) => Some(location),
            Err(e) => {
                warn!("Ignoring saved location: {}", e);
                None
            }
        }
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Cleared {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// In-process store, holding the same JSON the file store would write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put raw content in the slot, bypassing encoding.
    pub fn with_raw(content: &str) -> Self {
        Self {
            slot: Mutex::new(Some(content.to_string())),
        }
    }
}

impl LocationStore for MemoryStore {
    fn save(&self, location: &SavedLocation) -> Result<()> {
        let content = encode(location)?;
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| Error::StorageWrite(e.to_string()))?;
        *slot = Some(content);
        Ok(())
    }

    fn load(&self) -> Option<SavedLocation> {
        let slot = self.slot.lock().ok()?;
        let content = slot.as_deref()?;
        decode(content)
            .inspect_err(|e| warn!("Ignoring saved location: {}", e))
            .ok()
    }

    fn clear(&self) -> Result<()> {
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
        Ok(())
    }
}
