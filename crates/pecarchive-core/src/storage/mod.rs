//! On-disk layout of the archive.
//!
//! ```text
//! <root>/<account>/<YYYY>/<YYYY-MM-DD>/
//!     <folder>/<uid>_<subject>.eml
//!     index.csv
//!     index.json
//!     archive-<account>-<YYYY-MM-DD>.tar.gz
//!     digest.sha256
//!     summary.json
//! ```
//!
//! Every name component that comes from the server or the configuration is
//! sanitized before it touches the filesystem.

mod sanitize;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;

pub use sanitize::{message_filename, sanitize_filename, sanitize_folder_name};

use crate::config::Account;
use crate::{Error, Result};

/// CSV index file name.
pub const INDEX_CSV: &str = "index.csv";
/// JSON index file name.
pub const INDEX_JSON: &str = "index.json";
/// Digest file name.
pub const DIGEST_FILE: &str = "digest.sha256";
/// Run summary file name.
pub const SUMMARY_FILE: &str = "summary.json";
/// Message file extension, without the dot.
pub const EML_EXTENSION: &str = "eml";

/// Formats a date the way directory names and summaries spell it.
#[must_use]
pub fn date_dir_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Storage handler rooted at the archive base path.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Creates a handler for `root`. Nothing is created on disk.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the archive root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every archived day of one account.
    #[must_use]
    pub fn account_dir(&self, storage_name: &str) -> PathBuf {
        self.root.join(storage_name)
    }

    /// `<root>/<account>/<YYYY>/<YYYY-MM-DD>`.
    #[must_use]
    pub fn day_dir(&self, storage_name: &str, date: NaiveDate) -> PathBuf {
        self.account_dir(storage_name)
            .join(date.format("%Y").to_string())
            .join(date_dir_name(date))
    }

    /// Creates the day directory and one subdirectory per configured folder.
    ///
    /// Safe to call again for the same day.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if any directory cannot be created.
    pub async fn create_day(&self, account: &Account, date: NaiveDate) -> Result<PathBuf> {
        let day_dir = self.day_dir(&account.storage_name(), date);
        tokio::fs::create_dir_all(&day_dir)
            .await
            .map_err(|e| Error::storage(&day_dir, e))?;

        for folder in &account.folders {
            let folder_dir = day_dir.join(sanitize_folder_name(folder));
            tokio::fs::create_dir_all(&folder_dir)
                .await
                .map_err(|e| Error::storage(&folder_dir, e))?;
        }

        debug!(path = %day_dir.display(), "day directory ready");
        Ok(day_dir)
    }

    /// Writes the exact raw bytes of a message, replacing any earlier copy.
    ///
    /// Returns the written path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be written.
    pub async fn save_eml(
        day_dir: &Path,
        folder: &str,
        uid: u32,
        subject: Option<&str>,
        raw: &[u8],
    ) -> Result<PathBuf> {
        let folder_dir = day_dir.join(sanitize_folder_name(folder));
        tokio::fs::create_dir_all(&folder_dir)
            .await
            .map_err(|e| Error::storage(&folder_dir, e))?;

        let path = folder_dir.join(message_filename(uid, subject));
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| Error::storage(&path, e))?;

        debug!(path = %path.display(), bytes = raw.len(), "saved message");
        Ok(path)
    }
}

/// Lists the `.eml` files in one folder directory of a day, sorted by name.
///
/// A missing directory yields an empty list.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn saved_messages(day_dir: &Path, folder: &str) -> Result<Vec<PathBuf>> {
    let folder_dir = day_dir.join(sanitize_folder_name(folder));
    let entries = match std::fs::read_dir(&folder_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::storage(&folder_dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == EML_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_day_dir_layout() {
        let storage = Storage::new("/data/pec-archive");
        assert_eq!(
            storage.day_dir("mario", date()),
            PathBuf::from("/data/pec-archive/mario/2024/2024-01-15")
        );
    }

    #[tokio::test]
    async fn test_create_day_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Storage::new(tmp.path());
        let account = Account::new(
            "a@pec.it",
            "pw",
            "imap.pec.it",
            vec!["INBOX".into(), "Posta inviata".into()],
        );

        let first = storage.create_day(&account, date()).await.unwrap();
        let second = storage.create_day(&account, date()).await.unwrap();

        assert_eq!(first, second);
        assert!(first.join("INBOX").is_dir());
        assert!(first.join("Posta_inviata").is_dir());
    }

    #[tokio::test]
    async fn test_save_eml_overwrites() {
        let tmp = tempfile::tempdir().unwrap();

        let path = Storage::save_eml(tmp.path(), "INBOX", 7, Some("Fattura"), b"first")
            .await
            .unwrap();
        let again = Storage::save_eml(tmp.path(), "INBOX", 7, Some("Fattura"), b"second")
            .await
            .unwrap();

        assert_eq!(path, again);
        assert_eq!(path.file_name().unwrap(), "7_Fattura.eml");
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_saved_messages_lists_only_eml() {
        let tmp = tempfile::tempdir().unwrap();
        Storage::save_eml(tmp.path(), "INBOX", 2, None, b"x").await.unwrap();
        Storage::save_eml(tmp.path(), "INBOX", 1, None, b"y").await.unwrap();
        std::fs::write(tmp.path().join("INBOX").join("notes.txt"), b"z").unwrap();

        let files = saved_messages(tmp.path(), "INBOX").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["1_no_subject.eml", "2_no_subject.eml"]);

        assert!(saved_messages(tmp.path(), "Missing").unwrap().is_empty());
    }
}
