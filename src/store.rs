//! Storage for rendered variants.
//!
//! A [`Store`] has a single capability: hand out a writable [`Sink`] for a
//! key. The sink is an ordinary [`Write`] plus a fallible
//! [`close`](Sink::close) that makes the write durable. Jobs only ever see
//! these two traits, so backends can be swapped without touching
//! orchestration.
//!
//! Two backends ship with the crate:
//!
//! - [`LocalStore`]: files under a root directory. Each sink writes its own
//!   uniquely named `.<key>.XXXXXX.part` file, which is renamed onto `<key>`
//!   on close. Readers never observe a half-written variant under its final
//!   name, and concurrent writers of the same key never share a file: the
//!   last sink to close wins.
//! - [`MemoryStore`]: an in-process map, for tests and embedding.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend unavailable for {key}: {source}")]
    BackendUnavailable {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("write failed for {key}: {source}")]
    WriteFailed {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid store key: {0}")]
    InvalidKey(String),
}

impl StoreError {
    pub fn unavailable(key: &str, source: io::Error) -> Self {
        Self::BackendUnavailable {
            key: key.to_string(),
            source,
        }
    }

    pub fn write_failed(key: &str, source: io::Error) -> Self {
        Self::WriteFailed {
            key: key.to_string(),
            source,
        }
    }
}

/// An open destination for one key.
pub trait Sink: Write + Send {
    /// Finalize persistence. Dropping a sink without closing it abandons
    /// the write.
    fn close(self: Box<Self>) -> Result<(), StoreError>;
}

/// Key → sink. Implementations must be shareable across worker threads.
pub trait Store: Send + Sync {
    fn put(&self, key: &str) -> Result<Box<dyn Sink>, StoreError>;
}

/// Where a handler's variants go, as declared in config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreDescriptor {
    /// `local = "/mnt/gallery"`
    Local { root: PathBuf },
}

impl StoreDescriptor {
    /// Backend names accepted by [`StoreDescriptor::from_token`].
    pub const BACKENDS: [&'static str; 1] = ["local"];

    /// Build a descriptor from a config `backend = "param"` pair.
    ///
    /// Local roots are normalized lexically, so `a`, `./a` and `a/` name the
    /// same descriptor.
    pub fn from_token(backend: &str, param: &str) -> Option<Self> {
        match backend {
            "local" => Some(Self::Local {
                root: normalize_root(Path::new(param)),
            }),
            _ => None,
        }
    }

    /// Instantiate the backend. Nothing touches the disk until the first
    /// `put`.
    pub fn open(&self) -> Arc<dyn Store> {
        match self {
            Self::Local { root } => Arc::new(LocalStore::new(root)),
        }
    }
}

impl std::fmt::Display for StoreDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { root } => write!(f, "local:{}", root.display()),
        }
    }
}

/// Drop `.` components and trailing separators. `..` is kept: resolving it
/// lexically is wrong in the presence of symlinks.
fn normalize_root(path: &Path) -> PathBuf {
    let root: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        root
    }
}

/// Keys are flat file names: no separators, no traversal.
fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key == "."
        || key.contains("..")
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0');
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// =============================================================================
// Local filesystem
// =============================================================================

/// Filesystem store rooted at a directory, created on first use.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Final on-disk path for a key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl Store for LocalStore {
    fn put(&self, key: &str) -> Result<Box<dyn Sink>, StoreError> {
        validate_key(key)?;
        fs::create_dir_all(&self.root).map_err(|e| StoreError::unavailable(key, e))?;

        let file = tempfile::Builder::new()
            .prefix(&format!(".{key}."))
            .suffix(".part")
            .tempfile_in(&self.root)
            .map_err(|e| StoreError::unavailable(key, e))?;

        Ok(Box::new(LocalSink {
            key: key.to_string(),
            writer: BufWriter::new(file),
            final_path: self.path_for(key),
        }))
    }
}

/// Sink over a private temp file. Dropping it, or any failed step of
/// `close`, removes the temp file.
struct LocalSink {
    key: String,
    writer: BufWriter<NamedTempFile>,
    final_path: PathBuf,
}

impl Write for LocalSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Sink for LocalSink {
    fn close(self: Box<Self>) -> Result<(), StoreError> {
        let LocalSink {
            key,
            writer,
            final_path,
        } = *self;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::write_failed(&key, e.into_error()))?;
        file.as_file()
            .sync_all()
            .map_err(|e| StoreError::write_failed(&key, e))?;
        file.persist(&final_path)
            .map_err(|e| StoreError::write_failed(&key, e.into()))?;
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// In-process store. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    /// Stored keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned map still holds complete entries; writes land only on close.
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for MemoryStore {
    fn put(&self, key: &str) -> Result<Box<dyn Sink>, StoreError> {
        validate_key(key)?;
        Ok(Box::new(MemorySink {
            key: key.to_string(),
            buffer: Vec::new(),
            store: self.clone(),
        }))
    }
}

struct MemorySink {
    key: String,
    buffer: Vec<u8>,
    store: MemoryStore,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Sink for MemorySink {
    fn close(self: Box<Self>) -> Result<(), StoreError> {
        let MemorySink { key, buffer, store } = *self;
        store.lock().insert(key, buffer);
        Ok(())
    }
}
