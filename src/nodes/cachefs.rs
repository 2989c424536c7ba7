//! Read cache wrapper (`cachefs`).
//!
//! Whole files are cached on first read, bounded by a byte budget. Every
//! mutation through the wrapper invalidates the affected paths first, so a
//! read after a write always sees the new contents.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::NodeError;
use crate::layer::Layer;
use crate::nodes::memfs::normalize;
use crate::nodes::{check_creatable, opt_bool, opt_quantity, opt_str};
use crate::registry::{FieldKind, NodeSchema, SchemaField};
use crate::validator::rules::CACHE_POLICIES;
use crate::value::Config;
use crate::{CommitWriter, FsDir, FsError, FsRead, FsWrite, Metadata, ReadDirIter, SharedFs};

/// Default byte budget: 1 GiB.
pub const DEFAULT_MAX_BYTES: u64 = 1 << 30;

/// Eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Evict the least recently used file.
    #[default]
    Lru,
    /// Evict the least frequently used file, oldest first on ties.
    Lfu,
    /// Evict files read only once before files read repeatedly, least
    /// recently used first within each group.
    Arc,
}

impl CachePolicy {
    /// Parse a policy name (`LRU`, `LFU` or `ARC`).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "LRU" => Some(CachePolicy::Lru),
            "LFU" => Some(CachePolicy::Lfu),
            "ARC" => Some(CachePolicy::Arc),
            _ => None,
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CachePolicy::Lru => "LRU",
            CachePolicy::Lfu => "LFU",
            CachePolicy::Arc => "ARC",
        })
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Reads served from the cache.
    pub hits: u64,
    /// Reads passed to the underlying filesystem.
    pub misses: u64,
    /// Files dropped to stay within the budget.
    pub evictions: u64,
    /// Bytes currently cached.
    pub bytes: u64,
    /// Files currently cached.
    pub files: usize,
}

/// Builds a [`CacheFs`] over an underlying filesystem.
#[derive(Debug, Clone)]
pub struct CacheLayer {
    max_bytes: u64,
    policy: CachePolicy,
    metadata_cache: bool,
}

impl Default for CacheLayer {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            policy: CachePolicy::default(),
            metadata_cache: false,
        }
    }
}

impl CacheLayer {
    /// A layer with the given budget and policy, no metadata cache.
    pub fn new(max_bytes: u64, policy: CachePolicy) -> Self {
        Self {
            max_bytes,
            policy,
            metadata_cache: false,
        }
    }

    /// Also cache `metadata` results.
    pub fn with_metadata_cache(mut self, enabled: bool) -> Self {
        self.metadata_cache = enabled;
        self
    }

    /// Read `maxBytes` (or the older `size`), `policy` and `metadataCache`.
    pub fn from_config(config: &Config) -> Result<Self, NodeError> {
        let max_bytes = match opt_quantity(config, "maxBytes")? {
            Some(n) => n,
            None => opt_quantity(config, "size")?.unwrap_or(DEFAULT_MAX_BYTES),
        };
        let policy = match opt_str(config, "policy")? {
            Some(name) => CachePolicy::parse(name).ok_or_else(|| {
                NodeError::config("policy", format!("must be one of: {}", CACHE_POLICIES.join(", ")))
            })?,
            None => CachePolicy::default(),
        };
        Ok(Self {
            max_bytes,
            policy,
            metadata_cache: opt_bool(config, "metadataCache")?.unwrap_or(false),
        })
    }
}

impl Layer<SharedFs> for CacheLayer {
    type Backend = CacheFs;

    fn layer(self, inner: SharedFs) -> CacheFs {
        tracing::debug!(max_bytes = self.max_bytes, policy = %self.policy, "cache layer");
        CacheFs {
            inner,
            max_bytes: self.max_bytes,
            policy: self.policy,
            data: Arc::new(Mutex::new(DataCache::default())),
            metadata: self
                .metadata_cache
                .then(|| Arc::new(Mutex::new(HashMap::new()))),
        }
    }
}

pub(crate) fn schema() -> NodeSchema {
    NodeSchema::new("cachefs", "Caches file contents read from the underlying filesystem")
        .field(
            SchemaField::new("maxBytes", FieldKind::Int)
                .default_value(DEFAULT_MAX_BYTES as i64)
                .describe("Cache budget in bytes"),
        )
        .field(SchemaField::new("size", FieldKind::Int).describe("Older name for maxBytes"))
        .field(
            SchemaField::select("policy", CACHE_POLICIES)
                .default_value("LRU")
                .describe("Eviction policy"),
        )
        .field(
            SchemaField::new("metadataCache", FieldKind::Bool)
                .default_value(false)
                .describe("Also cache file metadata"),
        )
}

#[derive(Debug)]
struct Cached {
    data: Arc<[u8]>,
    last_used: u64,
    uses: u64,
}

#[derive(Debug, Default)]
struct DataCache {
    files: HashMap<PathBuf, Cached>,
    bytes: u64,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl DataCache {
    fn get(&mut self, path: &Path) -> Option<Arc<[u8]>> {
        self.clock += 1;
        let clock = self.clock;
        match self.files.get_mut(path) {
            Some(entry) => {
                entry.last_used = clock;
                entry.uses += 1;
                self.hits += 1;
                Some(Arc::clone(&entry.data))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn insert(&mut self, path: PathBuf, data: Arc<[u8]>, max_bytes: u64, policy: CachePolicy) {
        let size = data.len() as u64;
        if size > max_bytes {
            return;
        }
        self.remove(&path);
        while self.bytes + size > max_bytes {
            let Some(victim) = self.victim(policy) else {
                break;
            };
            self.remove(&victim);
            self.evictions += 1;
        }
        self.clock += 1;
        self.bytes += size;
        self.files.insert(
            path,
            Cached {
                data,
                last_used: self.clock,
                uses: 1,
            },
        );
    }

    fn victim(&self, policy: CachePolicy) -> Option<PathBuf> {
        let candidates = self.files.iter();
        let chosen = match policy {
            CachePolicy::Lru => candidates.min_by_key(|(_, c)| c.last_used),
            CachePolicy::Lfu => candidates.min_by_key(|(_, c)| (c.uses, c.last_used)),
            CachePolicy::Arc => candidates.min_by_key(|(_, c)| (c.uses > 1, c.last_used)),
        };
        chosen.map(|(p, _)| p.clone())
    }

    fn remove(&mut self, path: &Path) {
        if let Some(old) = self.files.remove(path) {
            self.bytes -= old.data.len() as u64;
        }
    }

    fn remove_tree(&mut self, root: &Path) {
        let doomed: Vec<PathBuf> = self
            .files
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect();
        for p in doomed {
            self.remove(&p);
        }
    }
}

/// Filesystem wrapper caching whole-file reads.
///
/// Clones share the cache.
#[derive(Clone)]
pub struct CacheFs {
    inner: SharedFs,
    max_bytes: u64,
    policy: CachePolicy,
    data: Arc<Mutex<DataCache>>,
    metadata: Option<Arc<Mutex<HashMap<PathBuf, Metadata>>>>,
}

impl fmt::Debug for CacheFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheFs")
            .field("max_bytes", &self.max_bytes)
            .field("policy", &self.policy)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl CacheFs {
    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let cache = self.data.lock();
        CacheStats {
            hits: cache.hits,
            misses: cache.misses,
            evictions: cache.evictions,
            bytes: cache.bytes,
            files: cache.files.len(),
        }
    }

    /// The configured eviction policy.
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Drop every cached entry under `path` (the path itself included).
    fn invalidate(&self, path: &Path) {
        let path = normalize(path);
        self.data.lock().remove_tree(&path);
        if let Some(meta) = &self.metadata {
            let mut meta = meta.lock();
            meta.retain(|p, _| !p.starts_with(&path));
            if let Some(parent) = path.parent() {
                meta.remove(parent);
            }
        }
    }
}

impl FsRead for CacheFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        let key = normalize(path);
        if let Some(data) = self.data.lock().get(&key) {
            return Ok(data.to_vec());
        }
        let data = self.inner.read(path)?;
        self.data
            .lock()
            .insert(key, Arc::from(data.as_slice()), self.max_bytes, self.policy);
        Ok(data)
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, FsError> {
        let Some(cache) = &self.metadata else {
            return self.inner.metadata(path);
        };
        let key = normalize(path);
        if let Some(meta) = cache.lock().get(&key) {
            return Ok(meta.clone());
        }
        let meta = self.inner.metadata(path)?;
        cache.lock().insert(key, meta.clone());
        Ok(meta)
    }
}

impl FsWrite for CacheFs {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        self.invalidate(path);
        self.inner.write(path, data)
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        self.invalidate(path);
        self.inner.remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.invalidate(from);
        self.invalidate(to);
        self.inner.rename(from, to)
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError> {
        check_creatable(&self.inner, path)?;
        let this = self.clone();
        Ok(Box::new(CommitWriter::new(path, move |p: &Path, data: &[u8]| {
            this.write(p, data)
        })))
    }
}

impl FsDir for CacheFs {
    fn read_dir(&self, path: &Path) -> Result<ReadDirIter, FsError> {
        self.inner.read_dir(path)
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        self.invalidate(path);
        self.inner.create_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.invalidate(path);
        self.inner.create_dir_all(path)
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        self.invalidate(path);
        self.inner.remove_dir(path)
    }
}
