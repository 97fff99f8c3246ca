//! LRU cache of files extracted from containers.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use flate2::read::GzDecoder;
use tracing::{debug, warn};

use super::error::ExtractionError;
use crate::archive::ARCHIVE_EXTENSION;

type Result<T> = std::result::Result<T, ExtractionError>;

/// Suffix of files still being written.
const PARTIAL_SUFFIX: &str = ".partial";

/// `<container parent dir>/<container name without .tar.gz>/<internal path>`.
#[must_use]
pub fn cache_key(archive_path: &Path, internal_path: &str) -> String {
    let parent = archive_path
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(ARCHIVE_EXTENSION).unwrap_or(&name);
    format!("{parent}/{stem}/{}", internal_path.trim_start_matches('/'))
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    size: u64,
    accessed: SystemTime,
    seq: u64,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    total: u64,
    seq: u64,
}

impl State {
    fn touch(&mut self, key: &str) {
        self.seq += 1;
        let seq = self.seq;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.accessed = SystemTime::now();
            entry.seq = seq;
        }
    }

    fn insert(&mut self, key: String, size: u64, accessed: SystemTime) {
        self.seq += 1;
        let entry = Entry {
            size,
            accessed,
            seq: self.seq,
        };
        if let Some(old) = self.entries.insert(key, entry) {
            self.total -= old.size;
        }
        self.total += size;
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.total -= entry.size;
        Some(entry)
    }

    /// Least recently used key other than `keep`.
    fn oldest(&self, keep: Option<&str>) -> Option<String> {
        self.entries
            .iter()
            .filter(|(key, _)| Some(key.as_str()) != keep)
            .min_by(|(ka, a), (kb, b)| {
                (a.accessed, a.seq)
                    .cmp(&(b.accessed, b.seq))
                    .then_with(|| ka.cmp(kb))
            })
            .map(|(key, _)| key.clone())
    }
}

/// Disk cache of single files pulled out of `.tar.gz` containers.
///
/// One instance owns one cache directory. All bookkeeping goes through a
/// single lock, so the cache can be shared between threads.
#[derive(Debug)]
pub struct RetrievalCache {
    root: PathBuf,
    max_bytes: u64,
    state: Mutex<State>,
    partial_seq: AtomicU64,
}

impl RetrievalCache {
    /// Opens the cache at `root`, creating the directory if needed.
    ///
    /// Files already present are tracked with their modification time as
    /// last access, and the budget is enforced right away.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Write`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>, max_bytes: u64) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| ExtractionError::Write {
            path: root.clone(),
            source,
        })?;

        let mut state = State::default();
        let mut seeded = Vec::new();
        scan(&root, &root, &mut seeded);
        for (key, size, modified) in seeded {
            state.insert(key, size, modified);
        }

        let cache = Self {
            root,
            max_bytes,
            state: Mutex::new(state),
            partial_seq: AtomicU64::new(0),
        };
        {
            let mut state = cache.lock();
            debug!(
                path = %cache.root.display(),
                files = state.entries.len(),
                bytes = state.total,
                "retrieval cache opened"
            );
            cache.evict(&mut state, None);
        }
        Ok(cache)
    }

    /// Cache directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Byte budget.
    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_bytes
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a local path holding `internal_path` from the container.
    ///
    /// A cached copy is returned without opening the container. Otherwise
    /// only the matching member is decompressed. A member matches when its
    /// path equals `internal_path` or ends with `/<internal_path>`.
    ///
    /// The lock covers only the bookkeeping. Decompression and the file
    /// write run unlocked, and the file appears under its final name only
    /// once complete.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractionError`] if the container is missing or
    /// unreadable, or no regular file matches.
    pub fn extract(&self, archive_path: &Path, internal_path: &str) -> Result<PathBuf> {
        let internal = internal_path.trim_start_matches('/');
        if !is_relative_inside(internal) {
            return Err(ExtractionError::InvalidPath(internal_path.to_string()));
        }

        let key = cache_key(archive_path, internal);
        let target = self.root.join(&key);

        {
            let mut state = self.lock();
            if state.entries.contains_key(&key) {
                if target.is_file() {
                    state.touch(&key);
                    refresh_mtime(&target);
                    debug!(key = %key, "cache hit");
                    return Ok(target);
                }
                state.remove(&key);
            }
        }

        if !archive_path.is_file() {
            return Err(ExtractionError::ArchiveNotFound(archive_path.to_path_buf()));
        }

        let content = read_member(archive_path, internal)?;
        let partial = self.partial_path(&target);
        write_file(&partial, &content)?;
        std::fs::rename(&partial, &target).map_err(|source| {
            let _ = std::fs::remove_file(&partial);
            ExtractionError::Write {
                path: target.clone(),
                source,
            }
        })?;

        let mut state = self.lock();
        state.insert(key.clone(), content.len() as u64, SystemTime::now());
        debug!(key = %key, bytes = content.len(), "extracted into cache");
        self.evict(&mut state, Some(&key));

        Ok(target)
    }

    /// Unique scratch name next to `target`.
    fn partial_path(&self, target: &Path) -> PathBuf {
        let n = self.partial_seq.fetch_add(1, Ordering::Relaxed);
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        target.with_file_name(format!(".{name}.{}-{n}{PARTIAL_SUFFIX}", std::process::id()))
    }

    /// Whether `key` is tracked and present on disk.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key) && self.root.join(key).is_file()
    }

    /// Tracked bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.lock().total
    }

    /// Number of tracked files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Deletes every cached file and recreates an empty cache directory.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Write`] if the directory cannot be
    /// removed or recreated.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock();
        let write_error = |source| ExtractionError::Write {
            path: self.root.clone(),
            source,
        };

        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(write_error(e)),
        }
        std::fs::create_dir_all(&self.root).map_err(write_error)?;

        *state = State::default();
        debug!(path = %self.root.display(), "retrieval cache cleared");
        Ok(())
    }

    /// Removes least recently used files until the budget holds. `keep` is
    /// never evicted, so the file just stored stays available.
    fn evict(&self, state: &mut State, keep: Option<&str>) {
        while state.total > self.max_bytes {
            let Some(key) = state.oldest(keep) else {
                break;
            };
            state.remove(&key);

            let path = self.root.join(&key);
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(key = %key, "evicted"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to evict"),
            }
            if let Some(parent) = path.parent() {
                self.remove_empty_dirs(parent);
            }
        }
    }

    /// Removes empty directories from `dir` upwards, stopping below the root.
    fn remove_empty_dirs(&self, dir: &Path) {
        let mut current = dir;
        while current != self.root && current.starts_with(&self.root) {
            let is_empty = std::fs::read_dir(current)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty || std::fs::remove_dir(current).is_err() {
                break;
            }
            let Some(parent) = current.parent() else {
                break;
            };
            current = parent;
        }
    }
}

/// Rejects absolute paths and `..` components.
fn is_relative_inside(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Collects `(key, size, mtime)` for every file below `dir`.
fn scan(root: &Path, dir: &Path, out: &mut Vec<(String, u64, SystemTime)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.is_dir() {
            scan(root, &path, out);
        } else if path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(PARTIAL_SUFFIX))
        {
            let _ = std::fs::remove_file(&path);
        } else if metadata.is_file()
            && let Ok(relative) = path.strip_prefix(root)
        {
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            out.push((key, metadata.len(), modified));
        }
    }
}

/// Writes `content` to `path`, creating parents. A parent removed by a
/// concurrent eviction in between is recreated once.
fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
    };
    write()
        .or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                write()
            } else {
                Err(e)
            }
        })
        .map_err(|source| ExtractionError::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn refresh_mtime(path: &Path) {
    if let Ok(file) = File::options().write(true).open(path) {
        let _ = file.set_modified(SystemTime::now());
    }
}

/// Decompresses the first member matching `internal`.
fn read_member(archive_path: &Path, internal: &str) -> Result<Vec<u8>> {
    let read_error = |source| ExtractionError::Read {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(read_error)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let suffix = format!("/{internal}");

    for entry in archive.entries().map_err(read_error)? {
        let mut entry = entry.map_err(read_error)?;
        let name = entry
            .path()
            .map_err(read_error)?
            .to_string_lossy()
            .trim_start_matches("./")
            .trim_end_matches('/')
            .to_string();

        if name != internal && !name.ends_with(&suffix) {
            continue;
        }
        if !entry.header().entry_type().is_file() {
            return Err(ExtractionError::NotAFile(name));
        }

        let mut content = Vec::new();
        entry.read_to_end(&mut content).map_err(read_error)?;
        return Ok(content);
    }

    Err(ExtractionError::MemberNotFound(internal.to_string()))
}
