//! Minimal opener-by-name abstraction so the parser never touches the
//! filesystem directly.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("IO error opening {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Opens a named resource as a byte stream. The parser depends only on
/// this trait, never on `std::fs` directly.
pub trait ResourceAccessor: Send + Sync {
    fn open(&self, path: &str) -> Result<Box<dyn Read>, ResourceError>;
}

/// Resolves paths relative to a base directory on disk.
pub struct FsResourceAccessor {
    base_dir: PathBuf,
}

impl FsResourceAccessor {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }
}

impl ResourceAccessor for FsResourceAccessor {
    fn open(&self, path: &str) -> Result<Box<dyn Read>, ResourceError> {
        let resolved = self.resolve(path);
        let file = File::open(&resolved).map_err(|source| ResourceError::Io {
            path: resolved.to_string_lossy().into_owned(),
            source,
        })?;
        Ok(Box::new(file))
    }
}

/// An in-memory set of named resources. Used by tests and by embedders
/// that already hold changelog text (e.g. fetched over the network)
/// rather than a path on disk.
#[derive(Default, Clone)]
pub struct InMemoryResourceAccessor {
    entries: HashMap<String, String>,
}

impl InMemoryResourceAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.entries.insert(path.into(), contents.into());
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.entries.insert(path.into(), contents.into());
    }
}

impl ResourceAccessor for InMemoryResourceAccessor {
    fn open(&self, path: &str) -> Result<Box<dyn Read>, ResourceError> {
        match self.entries.get(path) {
            Some(contents) => Ok(Box::new(std::io::Cursor::new(contents.clone().into_bytes()))),
            None => Err(ResourceError::NotFound(path.to_string())),
        }
    }
}
