//! Per-day `.tar.gz` containers and their SHA-256 digests.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::storage::{DIGEST_FILE, SUMMARY_FILE, date_dir_name, sanitize_folder_name};
use crate::{Error, Result};

/// Container extension.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

const DIGEST_EXTENSION: &str = ".sha256";

/// `archive-<account>-<YYYY-MM-DD>.tar.gz`.
#[must_use]
pub fn archive_name(storage_name: &str, date: NaiveDate) -> String {
    format!("archive-{storage_name}-{}{ARCHIVE_EXTENSION}", date_dir_name(date))
}

/// Member path of a saved message inside its day's container.
#[must_use]
pub fn internal_path(folder: &str, filename: &str) -> String {
    format!("{}/{filename}", sanitize_folder_name(folder))
}

/// Whether a day-directory entry stays out of the container.
fn is_excluded(name: &str) -> bool {
    name.ends_with(ARCHIVE_EXTENSION) || name.ends_with(DIGEST_EXTENSION) || name == SUMMARY_FILE
}

/// Packs every folder directory and index file of `day_dir` into
/// `archive_path`, replacing any earlier container.
///
/// Returns the container size in bytes.
///
/// # Errors
///
/// Returns [`Error::Compression`] if reading the day or writing the
/// container fails.
pub fn create_archive(day_dir: &Path, archive_path: &Path) -> Result<u64> {
    let pack = || -> io::Result<u64> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(day_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_excluded(&name) {
                entries.push((name, entry.path()));
            }
        }
        entries.sort();

        let file = BufWriter::new(File::create(archive_path)?);
        let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, path) in &entries {
            if path.is_dir() {
                tar.append_dir_all(name, path)?;
            } else {
                tar.append_path_with_name(path, name)?;
            }
        }
        tar.into_inner()?.finish()?.flush()?;

        Ok(std::fs::metadata(archive_path)?.len())
    };

    let size = pack().map_err(|e| {
        Error::Compression(format!("failed to create {}: {e}", archive_path.display()))
    })?;
    debug!(path = %archive_path.display(), bytes = size, "archive created");
    Ok(size)
}

/// Hex SHA-256 of a file, read in a streaming fashion.
///
/// # Errors
///
/// Returns any error from reading the file.
pub fn compute_sha256(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Writes `digest.sha256` next to the container as `"<hex>  <name>\n"`.
///
/// Returns the hex digest.
///
/// # Errors
///
/// Returns [`Error::Compression`] if the container cannot be hashed or the
/// digest file cannot be written.
pub fn create_digest(archive_path: &Path) -> Result<String> {
    let digest = compute_sha256(archive_path).map_err(|e| {
        Error::Compression(format!("failed to hash {}: {e}", archive_path.display()))
    })?;

    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digest_path = digest_path_for(archive_path);
    std::fs::write(&digest_path, format!("{digest}  {name}\n")).map_err(|e| {
        Error::Compression(format!("failed to write {}: {e}", digest_path.display()))
    })?;

    debug!(path = %digest_path.display(), sha256 = %digest, "digest written");
    Ok(digest)
}

/// `digest.sha256` in the container's directory.
#[must_use]
pub fn digest_path_for(archive_path: &Path) -> PathBuf {
    archive_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(DIGEST_FILE)
}

/// Whether the container still hashes to the persisted digest.
///
/// Any read failure or malformed digest file counts as a mismatch.
#[must_use]
pub fn verify(archive_path: &Path, digest_path: &Path) -> bool {
    let expected = match std::fs::read_to_string(digest_path) {
        Ok(text) => text.split_whitespace().next().map(str::to_ascii_lowercase),
        Err(e) => {
            warn!(path = %digest_path.display(), error = %e, "cannot read digest");
            None
        }
    };
    let Some(expected) = expected else {
        return false;
    };

    match compute_sha256(archive_path) {
        Ok(actual) => actual == expected,
        Err(e) => {
            warn!(path = %archive_path.display(), error = %e, "cannot hash archive");
            false
        }
    }
}

/// First `.tar.gz` in a directory, by name.
#[must_use]
pub fn find_archive_in_directory(dir: &Path) -> Option<PathBuf> {
    let mut archives: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().ends_with(ARCHIVE_EXTENSION))
        })
        .collect();
    archives.sort();
    archives.into_iter().next()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    fn populated_day() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let day = tmp.path();
        std::fs::create_dir_all(day.join("INBOX")).unwrap();
        std::fs::create_dir_all(day.join("Posta_inviata")).unwrap();
        std::fs::write(day.join("INBOX/1_a.eml"), b"message one").unwrap();
        std::fs::write(day.join("INBOX/2_b.eml"), b"message two").unwrap();
        std::fs::write(day.join("Posta_inviata/3_c.eml"), b"message three").unwrap();
        std::fs::write(day.join("index.csv"), b"uid\r\n").unwrap();
        std::fs::write(day.join("index.json"), b"[]").unwrap();
        std::fs::write(day.join("summary.json"), b"{}").unwrap();
        std::fs::write(day.join("digest.sha256"), b"old").unwrap();
        std::fs::write(day.join("archive-old-2024-01-14.tar.gz"), b"old").unwrap();
        tmp
    }

    fn member_names(archive: &Path) -> BTreeSet<String> {
        let file = File::open(archive).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                e.path().unwrap().to_string_lossy().trim_end_matches('/').to_string()
            })
            .collect()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(archive_name("mario", date()), "archive-mario-2024-01-15.tar.gz");
        assert_eq!(internal_path("Posta inviata", "3_c.eml"), "Posta_inviata/3_c.eml");
    }

    #[test]
    fn test_archive_excludes_control_files() {
        let day = populated_day();
        let archive = day.path().join(archive_name("mario", date()));

        let size = create_archive(day.path(), &archive).unwrap();
        assert!(size > 0);

        let names = member_names(&archive);
        let expected: BTreeSet<String> = [
            "INBOX",
            "INBOX/1_a.eml",
            "INBOX/2_b.eml",
            "Posta_inviata",
            "Posta_inviata/3_c.eml",
            "index.csv",
            "index.json",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_archive_member_contents() {
        let day = populated_day();
        let archive = day.path().join(archive_name("mario", date()));
        create_archive(day.path(), &archive).unwrap();

        let mut tar = tar::Archive::new(GzDecoder::new(File::open(&archive).unwrap()));
        let mut found = None;
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.path().unwrap().to_string_lossy() == "Posta_inviata/3_c.eml" {
                let mut body = Vec::new();
                entry.read_to_end(&mut body).unwrap();
                found = Some(body);
            }
        }
        assert_eq!(found.unwrap(), b"message three");
    }

    #[test]
    fn test_digest_file_format_and_verify() {
        let day = populated_day();
        let archive = day.path().join(archive_name("mario", date()));
        create_archive(day.path(), &archive).unwrap();

        let digest = create_digest(&archive).unwrap();
        assert_eq!(digest.len(), 64);

        let digest_path = day.path().join("digest.sha256");
        let text = std::fs::read_to_string(&digest_path).unwrap();
        assert_eq!(text, format!("{digest}  archive-mario-2024-01-15.tar.gz\n"));
        assert!(verify(&archive, &digest_path));
    }

    #[test]
    fn test_flipped_byte_fails_verification() {
        let day = populated_day();
        let archive = day.path().join(archive_name("mario", date()));
        create_archive(day.path(), &archive).unwrap();
        create_digest(&archive).unwrap();

        let mut bytes = std::fs::read(&archive).unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x01;
        std::fs::write(&archive, bytes).unwrap();

        assert!(!verify(&archive, &digest_path_for(&archive)));
    }

    #[test]
    fn test_verify_missing_files_is_false() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("missing.tar.gz");
        assert!(!verify(&archive, &tmp.path().join("digest.sha256")));
    }

    #[test]
    fn test_rerun_overwrites_archive() {
        let day = populated_day();
        let archive = day.path().join(archive_name("mario", date()));
        create_archive(day.path(), &archive).unwrap();

        std::fs::write(day.path().join("INBOX/4_d.eml"), b"late").unwrap();
        create_archive(day.path(), &archive).unwrap();

        assert!(member_names(&archive).contains("INBOX/4_d.eml"));
    }

    #[test]
    fn test_find_archive_in_directory() {
        let day = populated_day();
        assert_eq!(
            find_archive_in_directory(day.path()).unwrap().file_name().unwrap(),
            "archive-old-2024-01-14.tar.gz"
        );

        let empty = tempfile::tempdir().unwrap();
        assert!(find_archive_in_directory(empty.path()).is_none());
    }

    #[test]
    fn test_compute_sha256_known_value() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            compute_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
