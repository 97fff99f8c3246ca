//! Archive tree browsing and file access.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::ReadError;
use super::search::{SearchHit, SearchQuery, SearchResults};
use crate::archive::{find_archive_in_directory, internal_path};
use crate::cache::RetrievalCache;
use crate::index::MessageRecord;
use crate::storage::{EML_EXTENSION, INDEX_JSON, date_dir_name};

type Result<T> = std::result::Result<T, ReadError>;

/// An account directory and the years it holds, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account directory name.
    pub name: String,
    /// Year directories, descending.
    pub years: Vec<String>,
}

/// An archived day and how many messages its index lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInfo {
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Entries in `index.json`.
    pub message_count: usize,
}

/// Read-only view of an archive root.
///
/// Every path component supplied by a caller is reduced to its base name
/// and the resulting path must stay under the root. Methods block on
/// filesystem I/O.
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    root: PathBuf,
    cache: Option<Arc<RetrievalCache>>,
}

impl ArchiveReader {
    /// Creates a reader that falls back to `cache` for messages missing on
    /// disk.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, cache: Arc<RetrievalCache>) -> Self {
        Self {
            root: root.into(),
            cache: Some(cache),
        }
    }

    /// Creates a reader that only serves files present on disk.
    #[must_use]
    pub fn without_cache(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: None,
        }
    }

    /// Archive root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists account directories, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Internal`] if the root exists but cannot be read.
    pub fn list_accounts(&self) -> Result<Vec<AccountInfo>> {
        let mut accounts = Vec::new();
        for name in subdirectories(&self.root)? {
            let mut years: Vec<String> = subdirectories(&self.root.join(&name))?
                .into_iter()
                .filter(|y| is_year(y))
                .collect();
            years.sort_unstable_by(|a, b| b.cmp(a));
            accounts.push(AccountInfo { name, years });
        }
        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(accounts)
    }

    /// Lists the archived days of one account in one year, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::InvalidInput`] for a malformed year and
    /// [`ReadError::NotFound`] for an unknown account.
    pub fn list_dates(&self, account: &str, year: &str) -> Result<Vec<DateInfo>> {
        if !is_year(year) {
            return Err(ReadError::InvalidInput(format!("invalid year '{year}'")));
        }
        let account_dir = self.account_dir(account)?;

        let mut dates: Vec<DateInfo> = subdirectories(&account_dir.join(year))?
            .into_iter()
            .map(|date| {
                let message_count = load_index(&account_dir.join(year).join(&date)).len();
                DateInfo {
                    date,
                    message_count,
                }
            })
            .collect();
        dates.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(dates)
    }

    /// Lists the indexed messages of one day, optionally restricted to a
    /// folder (compared case-insensitively).
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::InvalidInput`] for a malformed date and
    /// [`ReadError::NotFound`] when the account or day has no messages.
    pub fn list_messages(
        &self,
        account: &str,
        date: &str,
        folder: Option<&str>,
    ) -> Result<Vec<MessageRecord>> {
        let date = parse_date(date)?;
        let day_dir = self.day_dir(account, date)?;

        let mut records = load_index(&day_dir);
        if records.is_empty() {
            return Err(ReadError::NotFound(format!("no emails found for date {date}")));
        }
        if let Some(folder) = folder {
            records.retain(|r| r.folder.eq_ignore_ascii_case(folder));
        }
        Ok(records)
    }

    /// Searches every matching day's index.
    ///
    /// Hits are ordered newest day first and paginated with `offset` and
    /// `limit`; `total` counts every hit.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::InvalidInput`] if the query sets no filter or
    /// names an invalid account.
    pub fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        if !query.has_criteria() {
            return Err(ReadError::InvalidInput(
                "at least one search parameter is required".into(),
            ));
        }

        let accounts = match &query.account {
            Some(account) => {
                let name = base_name(account)?;
                if self.root.join(&name).is_dir() {
                    vec![name]
                } else {
                    Vec::new()
                }
            }
            None => subdirectories(&self.root)?,
        };

        let mut hits = Vec::new();
        for account in accounts {
            let account_dir = self.root.join(&account);
            for year in subdirectories(&account_dir)?.into_iter().filter(|y| is_year(y)) {
                for day in subdirectories(&account_dir.join(&year))? {
                    let Ok(date) = NaiveDate::parse_from_str(&day, "%Y-%m-%d") else {
                        continue;
                    };
                    if !query.includes_date(date) {
                        continue;
                    }
                    let records = load_index(&account_dir.join(&year).join(&day));
                    hits.extend(
                        records
                            .into_iter()
                            .filter(|r| query.matches(r))
                            .map(|message| SearchHit {
                                account: account.clone(),
                                date,
                                message,
                            }),
                    );
                }
            }
        }

        hits.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.account.cmp(&b.account)));
        let total = hits.len();
        let hits = hits
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();
        debug!(total, "search finished");
        Ok(SearchResults { total, hits })
    }

    /// Local path of a message file: the saved copy if it still exists,
    /// otherwise a copy extracted from that day's container.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::InvalidInput`] for unsafe components or a
    /// non-`.eml` name and [`ReadError::NotFound`] when neither source has
    /// the file.
    pub fn message_path(
        &self,
        account: &str,
        date: &str,
        folder: &str,
        filename: &str,
    ) -> Result<PathBuf> {
        let date = parse_date(date)?;
        let folder = base_name(folder)?;
        let filename = base_name(filename)?;
        if Path::new(&filename).extension().is_none_or(|ext| ext != EML_EXTENSION) {
            return Err(ReadError::InvalidInput(
                "only .eml files can be read".into(),
            ));
        }

        let day_dir = self.day_dir(account, date)?;
        let path = self.checked(day_dir.join(&folder).join(&filename))?;
        if path.is_file() {
            return Ok(path);
        }

        let Some(cache) = &self.cache else {
            return Err(ReadError::NotFound(format!("email file {folder}/{filename}")));
        };
        let archive = find_archive_in_directory(&day_dir)
            .ok_or_else(|| ReadError::NotFound(format!("email file {folder}/{filename}")))?;
        debug!(archive = %archive.display(), "serving message from container");
        Ok(cache.extract(&archive, &internal_path(&folder, &filename))?)
    }

    /// Bytes of a message file. See [`Self::message_path`].
    ///
    /// # Errors
    ///
    /// As [`Self::message_path`], plus [`ReadError::Internal`] if the file
    /// cannot be read.
    pub fn read_message(
        &self,
        account: &str,
        date: &str,
        folder: &str,
        filename: &str,
    ) -> Result<Vec<u8>> {
        let path = self.message_path(account, date, folder, filename)?;
        Ok(std::fs::read(path)?)
    }

    /// Path of a day's container.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::NotFound`] when the day or its container is
    /// missing.
    pub fn archive_path(&self, account: &str, date: &str) -> Result<PathBuf> {
        let date = parse_date(date)?;
        let day_dir = self.day_dir(account, date)?;
        find_archive_in_directory(&day_dir)
            .ok_or_else(|| ReadError::NotFound(format!("archive file for {date}")))
    }

    /// Bytes of a day's container.
    ///
    /// # Errors
    ///
    /// As [`Self::archive_path`], plus [`ReadError::Internal`] if the file
    /// cannot be read.
    pub fn read_archive(&self, account: &str, date: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.archive_path(account, date)?)?)
    }

    fn account_dir(&self, account: &str) -> Result<PathBuf> {
        let dir = self.checked(self.root.join(base_name(account)?))?;
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ReadError::NotFound(format!("account '{account}'")))
        }
    }

    fn day_dir(&self, account: &str, date: NaiveDate) -> Result<PathBuf> {
        let dir = self
            .account_dir(account)?
            .join(date.year().to_string())
            .join(date_dir_name(date));
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ReadError::NotFound(format!("archive date {date}")))
        }
    }

    /// Ensures `path` resolves inside the root, following symlinks when
    /// the path exists.
    fn checked(&self, path: PathBuf) -> Result<PathBuf> {
        let invalid = || ReadError::InvalidInput("invalid path".into());
        if !path.starts_with(&self.root) {
            return Err(invalid());
        }
        if let (Ok(resolved), Ok(root)) = (path.canonicalize(), self.root.canonicalize())
            && !resolved.starts_with(root)
        {
            return Err(invalid());
        }
        Ok(path)
    }
}

/// Last component of a caller-supplied name. `..`, `.` and empty names are
/// rejected.
fn base_name(component: &str) -> Result<String> {
    Path::new(component)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| n != "." && n != "..")
        .ok_or_else(|| ReadError::InvalidInput(format!("invalid path component '{component}'")))
}

fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ReadError::InvalidInput(format!("invalid date '{date}', use YYYY-MM-DD")))
}

fn is_year(name: &str) -> bool {
    name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit())
}

/// Names of the subdirectories of `dir`, sorted. A missing directory has
/// none.
fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ReadError::Internal(format!("{}: {e}", dir.display()))),
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

/// Records of one day; a missing or unreadable index counts as empty.
fn load_index(day_dir: &Path) -> Vec<MessageRecord> {
    let path = day_dir.join(INDEX_JSON);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read index");
            return Vec::new();
        }
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "cannot parse index");
        Vec::new()
    })
}
