//! Read access to game files stored in a prioritized stack of containers.
//!
//! Containers are opened once per batch. Reads probe the highest-priority
//! container first and return the first hit.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::{debug, info, warn};
use thiserror::Error;

/// Default container load order, lowest priority first.
pub const DEFAULT_LOAD_ORDER: [&str; 12] = [
    "common.MPQ",
    "common-2.MPQ",
    "expansion.MPQ",
    "lichking.MPQ",
    "patch.MPQ",
    "patch-2.MPQ",
    "patch-3.MPQ",
    "patch-A.MPQ",
    "patch-B.MPQ",
    "patch-C.MPQ",
    "patch-Y.MPQ",
    "patch-Z.MPQ",
];

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no containers found under {0}")]
    NoContainers(PathBuf),

    #[error("failed to read {path} from {container}: {source}")]
    Read {
        container: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("container {0} is poisoned")]
    Poisoned(String),
}

/// A single container of virtual files.
pub trait ArchiveSource: Send {
    fn name(&self) -> &str;

    /// Return the file bytes, `Ok(None)` when the path is not stored here.
    fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>, ArchiveError>;
}

/// Normalise a virtual path to lowercase with `/` separators.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .trim_start_matches('/')
        .to_ascii_lowercase()
}

// ─── Directory container ──────────────────────────────────────────────────────

/// A container backed by an extracted directory tree. Lookups are
/// case-insensitive because virtual paths come from data with mixed casing.
#[derive(Debug)]
pub struct DirectoryArchive {
    name: String,
    root: PathBuf,
    listing: Option<HashMap<String, PathBuf>>,
}

impl DirectoryArchive {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self {
            name,
            root,
            listing: None,
        }
    }

    fn build_listing(&self) -> Result<HashMap<String, PathBuf>, ArchiveError> {
        let mut listing = HashMap::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir).map_err(|source| ArchiveError::Read {
                container: self.name.clone(),
                path: dir.display().to_string(),
                source,
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = normalize_path(&relative.to_string_lossy());
                    listing.insert(key, path);
                }
            }
        }
        debug!("indexed {} files in {}", listing.len(), self.name);
        Ok(listing)
    }
}

impl ArchiveSource for DirectoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        if self.listing.is_none() {
            self.listing = Some(self.build_listing()?);
        }
        let key = normalize_path(path);
        let Some(file) = self.listing.as_ref().and_then(|listing| listing.get(&key)) else {
            return Ok(None);
        };
        fs::read(file)
            .map(Some)
            .map_err(|source| ArchiveError::Read {
                container: self.name.clone(),
                path: path.to_string(),
                source,
            })
    }
}

// ─── In-memory container ──────────────────────────────────────────────────────

/// A container holding files in memory, keyed by normalised virtual path.
#[derive(Debug, Default, Clone)]
pub struct MemoryArchive {
    name: String,
    files: HashMap<String, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: HashMap::new(),
        }
    }

    pub fn insert(&mut self, path: &str, bytes: Vec<u8>) {
        self.files.insert(normalize_path(path), bytes);
    }

    pub fn with_file(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.insert(path, bytes);
        self
    }
}

impl ArchiveSource for MemoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        Ok(self.files.get(&normalize_path(path)).cloned())
    }
}

// ─── Pool ─────────────────────────────────────────────────────────────────────

/// Prioritized container stack. Each handle sits behind its own lock so reads
/// are serialized per container.
#[derive(Default)]
pub struct ArchivePool {
    /// Lowest priority first.
    containers: Vec<Mutex<Box<dyn ArchiveSource>>>,
}

impl ArchivePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every container of `load_order` that exists under `data_dir`.
    ///
    /// When none of the named containers exist, `data_dir` itself is treated
    /// as a single extracted container.
    pub fn open(data_dir: &Path, load_order: &[String]) -> Result<Self, ArchiveError> {
        let mut pool = Self::new();
        for name in load_order {
            let candidate = data_dir.join(name);
            if candidate.is_dir() {
                info!("opened container {}", candidate.display());
                pool.push(Box::new(DirectoryArchive::open(candidate)));
            } else {
                debug!("container {} not present", candidate.display());
            }
        }

        if pool.is_empty() {
            if !data_dir.is_dir() {
                return Err(ArchiveError::NoContainers(data_dir.to_path_buf()));
            }
            warn!(
                "no named containers under {}, reading it as one extracted tree",
                data_dir.display()
            );
            pool.push(Box::new(DirectoryArchive::open(data_dir)));
        }
        Ok(pool)
    }

    /// Add a container with higher priority than every container already present.
    pub fn push(&mut self, source: Box<dyn ArchiveSource>) {
        self.containers.push(Mutex::new(source));
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Read `path` from the highest-priority container that stores it.
    pub fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        for container in self.containers.iter().rev() {
            let mut source = container
                .lock()
                .map_err(|_| ArchiveError::Poisoned(path.to_string()))?;
            if let Some(bytes) = source.read(path)? {
                debug!("read {} from {}", path, source.name());
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    /// Read `path`, logging container failures and folding them into not-found.
    pub fn try_read(&self, path: &str) -> Option<Vec<u8>> {
        match self.read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("{err}");
                None
            }
        }
    }

    /// Read the first candidate path that exists, returning it with its bytes.
    pub fn read_first<'a>(&self, candidates: &[&'a str]) -> Option<(&'a str, Vec<u8>)> {
        candidates
            .iter()
            .find_map(|path| self.try_read(path).map(|bytes| (*path, bytes)))
    }

    /// Release every container handle.
    pub fn close_all(&mut self) {
        if !self.containers.is_empty() {
            info!("closing {} containers", self.containers.len());
        }
        self.containers.clear();
    }
}

impl Drop for ArchivePool {
    fn drop(&mut self) {
        self.close_all();
    }
}
