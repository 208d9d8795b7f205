use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use odb_store::{
    CachingDb, LazyCache, ObjectDbRead, ObjectDbWrite, ObjectInfo, ObjectStream, RawObject,
    StoreError, StoreResult,
};
use odb_types::{Digest, PartialDigest};
use tracing::{debug, warn};

use crate::config::PackedDbConfig;
use crate::entity::PackEntity;
use crate::error::PackResult;

/// One registered pack.
///
/// `hits` starts at the pack's byte size and grows by one per lookup served
/// from this pack. Counts are best effort: they only steer the scan order.
struct RegistryEntry {
    hits: AtomicU64,
    entity: Arc<PackEntity>,
}

type Registry = RwLock<Vec<Arc<RegistryEntry>>>;

/// Counters describing the work a [`PackedDb`] has done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackedDbStats {
    /// Lookups answered by some pack.
    pub queries: u64,
    /// Directory listings performed by refreshes.
    pub directory_scans: u64,
    /// Packs currently registered.
    pub packs: usize,
}

/// Read-only database over every `pack-*.pack` file in one directory.
///
/// The pack registry is built on first use. Later refreshes through
/// [`CachingDb::update_cache`] compare the directory's modification time
/// with the one seen last and only list the directory when it moved.
///
/// Lookups scan packs in order of popularity. Every
/// [`sort_interval`](PackedDbConfig::sort_interval) answered queries the
/// registry is re-sorted so that packs serving many lookups come first.
/// A miss does not trigger a refresh; callers that expect new packs call
/// `update_cache` and retry.
pub struct PackedDb {
    root: PathBuf,
    config: PackedDbConfig,
    entries: LazyCache<Registry>,
    /// Held for the whole of a refresh.
    root_mtime: Mutex<Option<SystemTime>>,
    query_count: AtomicU64,
    directory_scans: AtomicU64,
}

impl PackedDb {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, PackedDbConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: PackedDbConfig) -> Self {
        Self {
            root: root.into(),
            config,
            entries: LazyCache::new("entities"),
            root_mtime: Mutex::new(None),
            query_count: AtomicU64::new(0),
            directory_scans: AtomicU64::new(0),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &PackedDbConfig {
        &self.config
    }

    /// Snapshot of the registered pack entities in scan order.
    pub fn entities(&self) -> StoreResult<Vec<Arc<PackEntity>>> {
        Ok(self
            .snapshot()?
            .into_iter()
            .map(|entry| Arc::clone(&entry.entity))
            .collect())
    }

    pub fn stats(&self) -> PackedDbStats {
        let packs = self
            .entries
            .get()
            .map(|registry| registry.read().expect("lock poisoned").len())
            .unwrap_or(0);
        PackedDbStats {
            queries: self.query_count.load(Ordering::Relaxed),
            directory_scans: self.directory_scans.load(Ordering::Relaxed),
            packs,
        }
    }

    /// Expand an abbreviated digest to the single full digest it names.
    ///
    /// Every pack is examined: a second, different match anywhere makes the
    /// name ambiguous. The same digest stored in several packs is one match.
    pub fn partial_to_complete(&self, partial: &PartialDigest) -> StoreResult<Digest> {
        let mut candidate: Option<Digest> = None;
        for entry in self.snapshot()? {
            let index = match entry.entity.index() {
                Ok(index) => index,
                Err(e) => {
                    debug!(path = %entry.entity.path().display(), error = %e, "skipping pack");
                    continue;
                }
            };
            if let Some(slot) = index.partial_sha_to_index(partial)? {
                let found = index.sha(slot);
                match candidate {
                    Some(existing) if existing != found => {
                        return Err(StoreError::Ambiguous(partial.clone()));
                    }
                    _ => candidate = Some(found),
                }
            }
        }
        candidate.ok_or_else(|| StoreError::NotFound(partial.to_hex()))
    }

    /// [`partial_to_complete`](Self::partial_to_complete) for a hex prefix.
    pub fn partial_to_complete_hex(&self, prefix: &str) -> StoreResult<Digest> {
        let partial = PartialDigest::from_hex(prefix)?;
        self.partial_to_complete(&partial)
    }

    fn registry(&self) -> StoreResult<&Registry> {
        self.entries.get_or_resolve(|| {
            let registry = RwLock::new(Vec::new());
            self.reconcile(&registry, true)?;
            Ok(Some(registry))
        })
    }

    fn snapshot(&self) -> StoreResult<Vec<Arc<RegistryEntry>>> {
        Ok(self.registry()?.read().expect("lock poisoned").clone())
    }

    /// Bring `registry` in line with the pack files in the root directory.
    fn reconcile(&self, registry: &Registry, force: bool) -> StoreResult<bool> {
        let mut last_mtime = self.root_mtime.lock().expect("lock poisoned");
        let mtime = std::fs::metadata(&self.root)?.modified()?;
        if !force && last_mtime.is_some_and(|last| mtime <= last) {
            return Ok(false);
        }

        *last_mtime = Some(mtime);
        self.directory_scans.fetch_add(1, Ordering::Relaxed);
        let on_disk = list_packs(&self.root)?;
        let registered: HashSet<PathBuf> = registry
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|entry| entry.entity.path().to_path_buf())
            .collect();

        let mut added = Vec::new();
        for path in on_disk.difference(&registered) {
            match self.open_entry(path) {
                Ok(entry) => added.push(Arc::new(entry)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable pack");
                }
            }
        }

        let changed = {
            let mut entries = registry.write().expect("lock poisoned");
            let before = entries.len();
            entries.retain(|entry| {
                let keep = on_disk.contains(entry.entity.path());
                if !keep {
                    entry.entity.release();
                }
                keep
            });
            let removed = before - entries.len();
            let added_count = added.len();
            entries.extend(added);
            sort_by_hits(&mut entries);

            if removed > 0 || added_count > 0 {
                debug!(
                    root = %self.root.display(),
                    added = added_count,
                    removed,
                    packs = entries.len(),
                    "pack registry updated"
                );
            }
            removed > 0 || added_count > 0
        };

        Ok(changed)
    }

    fn open_entry(&self, path: &Path) -> PackResult<RegistryEntry> {
        let entity = PackEntity::open(path, self.config.allow_mmap)?;
        let hits = entity.pack()?.size();
        Ok(RegistryEntry {
            hits: AtomicU64::new(hits),
            entity: Arc::new(entity),
        })
    }

    /// Locate `digest`, returning the owning entity and the index slot.
    fn resolve(&self, digest: &Digest) -> StoreResult<(Arc<PackEntity>, u32)> {
        let registry = self.registry()?;

        let interval = self.config.sort_interval;
        if interval > 0 && self.query_count.load(Ordering::Relaxed) % interval == 0 {
            // skipped while a refresh or another sort holds the registry
            if let Ok(mut entries) = registry.try_write() {
                sort_by_hits(&mut entries);
            }
        }

        let entries = registry.read().expect("lock poisoned").clone();
        for entry in entries {
            let index = match entry.entity.index() {
                Ok(index) => index,
                Err(e) => {
                    debug!(path = %entry.entity.path().display(), error = %e, "skipping pack");
                    continue;
                }
            };
            if let Some(slot) = index.sha_to_index(digest) {
                entry.hits.fetch_add(1, Ordering::Relaxed);
                self.query_count.fetch_add(1, Ordering::Relaxed);
                return Ok((Arc::clone(&entry.entity), slot));
            }
        }
        Err(StoreError::NotFound(digest.to_hex()))
    }
}

impl ObjectDbRead for PackedDb {
    fn has_object(&self, digest: &Digest) -> bool {
        self.resolve(digest).is_ok()
    }

    fn info(&self, digest: &Digest) -> StoreResult<ObjectInfo> {
        let (entity, slot) = self.resolve(digest)?;
        Ok(entity.info_at_index(slot)?)
    }

    fn stream(&self, digest: &Digest) -> StoreResult<ObjectStream> {
        let (entity, slot) = self.resolve(digest)?;
        Ok(entity.stream_at_index(slot)?)
    }

    fn size(&self) -> StoreResult<usize> {
        let mut total = 0;
        for entry in self.snapshot()? {
            total += entry.entity.index()?.size() as usize;
        }
        Ok(total)
    }

    fn digests(&self) -> StoreResult<Box<dyn Iterator<Item = Digest> + '_>> {
        let entries = self.snapshot()?;
        Ok(Box::new(entries.into_iter().flat_map(|entry| {
            let index = match entry.entity.index() {
                Ok(index) => Some(index),
                Err(e) => {
                    debug!(path = %entry.entity.path().display(), error = %e, "skipping pack");
                    None
                }
            };
            index
                .into_iter()
                .flat_map(|index| (0..index.size()).map(move |slot| index.sha(slot)))
        })))
    }
}

impl ObjectDbWrite for PackedDb {
    fn store(&self, _object: &RawObject) -> StoreResult<Digest> {
        Err(StoreError::Unsupported(
            "packs are immutable; store objects in a loose object database",
        ))
    }
}

impl CachingDb for PackedDb {
    fn update_cache(&self, force: bool) -> StoreResult<bool> {
        let registry = self.registry()?;
        self.reconcile(registry, force)
    }
}

impl std::fmt::Debug for PackedDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackedDb")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn sort_by_hits(entries: &mut [Arc<RegistryEntry>]) {
    entries.sort_by_cached_key(|entry| Reverse(entry.hits.load(Ordering::Relaxed)));
}

fn list_packs(root: &Path) -> std::io::Result<HashSet<PathBuf>> {
    let mut packs = HashSet::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with("pack-") && name.ends_with(".pack") && entry.file_type()?.is_file() {
            packs.insert(entry.path());
        }
    }
    Ok(packs)
}
