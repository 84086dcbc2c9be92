//! Binary object storage for originals and derivatives.
//!
//! Objects are addressed by relative, slash-separated names such as
//! `photos/travel/2025/10/IMG_0001.jpg`. Saving to an existing name overwrites it,
//! which is what makes forced derivative regeneration reuse the same path.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage name: {0:?}")]
    InvalidName(String),

    #[error("storage object not found: {0}")]
    NotFound(String),

    #[error("storage I/O failed for {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(name: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(name.to_string())
        } else {
            StorageError::Io {
                name: name.to_string(),
                source,
            }
        }
    }
}

pub trait Storage: Send + Sync {
    /// Write `data` under `name`, replacing any existing object.
    fn save(&self, name: &str, data: &[u8]) -> Result<(), StorageError>;

    fn open(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    fn exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Remove an object. Deleting a missing object is not an error.
    fn delete(&self, name: &str) -> Result<(), StorageError>;

    /// Public URL path for an object (relative to the site origin).
    fn url(&self, name: &str) -> String;

    /// First name derived from `name` that is not taken yet: `a.jpg`, `a_1.jpg`, `a_2.jpg`...
    fn available_name(&self, name: &str) -> Result<String, StorageError> {
        if !self.exists(name)? {
            return Ok(name.to_string());
        }

        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => {
                (stem.to_string(), format!(".{}", ext))
            }
            _ => (name.to_string(), String::new()),
        };

        let mut n = 1u32;
        loop {
            let candidate = format!("{}_{}{}", stem, n, ext);
            if !self.exists(&candidate)? {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

/// Storage on the local filesystem under a media root.
pub struct FileStorage {
    root: PathBuf,
    base_url: String,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage name onto a path inside the root, rejecting anything that
    /// could escape it.
    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(name);
        if name.is_empty() || relative.is_absolute() {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        for component in relative.components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidName(name.to_string()));
            }
        }
        Ok(self.root.join(relative))
    }
}

impl Storage for FileStorage {
    fn save(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(name, e))?;
        }

        // Write beside the target and rename so readers never see a half-written file
        let tmp = path.with_extension("part");
        fs::write(&tmp, data).map_err(|e| StorageError::io(name, e))?;
        fs::rename(&tmp, &path).map_err(|e| StorageError::io(name, e))?;
        Ok(())
    }

    fn open(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(name)?;
        fs::read(&path).map_err(|e| StorageError::io(name, e))
    }

    fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.resolve(name)?;
        Ok(path.is_file())
    }

    fn delete(&self, name: &str) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(name, e)),
        }
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }
}
