//! Record accumulation and index file output.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::csv;
use super::model::{IndexStats, MessageRecord};
use crate::storage::{INDEX_CSV, INDEX_JSON, saved_messages};
use crate::{Error, Result};

/// Collects the records of one archive day.
///
/// A message seen twice (same folder and UID) keeps its first position and
/// takes the latest contents, so re-running a day never duplicates rows.
#[derive(Debug, Default)]
pub struct Indexer {
    records: Vec<MessageRecord>,
    positions: HashMap<(String, u32), usize>,
}

impl Indexer {
    /// Creates an empty indexer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, replacing any earlier one for the same folder and UID.
    pub fn add(&mut self, record: MessageRecord) {
        let key = (record.folder.clone(), record.uid);
        if let Some(&position) = self.positions.get(&key) {
            self.records[position] = record;
        } else {
            self.positions.insert(key, self.records.len());
            self.records.push(record);
        }
    }

    /// Builds a record from raw bytes and adds it.
    pub fn add_message(&mut self, folder: &str, uid: u32, filename: &str, raw: &[u8]) {
        self.add(MessageRecord::from_raw(folder, uid, filename, raw));
    }

    /// Records in arrival order.
    #[must_use]
    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by folder, then UID.
    fn ordered(&self) -> Vec<&MessageRecord> {
        let mut ordered: Vec<_> = self.records.iter().collect();
        ordered.sort_by(|a, b| a.folder.cmp(&b.folder).then(a.uid.cmp(&b.uid)));
        ordered
    }

    /// Totals over every record.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::default();
        for record in &self.records {
            stats.total_messages += 1;
            stats.total_size_bytes += record.size;
            *stats.folders.entry(record.folder.clone()).or_default() += 1;
        }
        stats
    }

    /// Writes `index.csv` with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] if the file cannot be written.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let write = || -> std::io::Result<()> {
            let mut out = BufWriter::new(File::create(path)?);
            csv::write_row(&mut out, &csv::HEADER)?;
            for record in self.ordered() {
                csv::write_row(&mut out, &record.csv_fields())?;
            }
            out.flush()
        };
        write().map_err(|e| index_error(path, &e))
    }

    /// Writes `index.json` as a pretty-printed array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] if the file cannot be written.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let write = || -> std::io::Result<()> {
            let mut out = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut out, &self.ordered())?;
            out.write_all(b"\n")?;
            out.flush()
        };
        write().map_err(|e| index_error(path, &e))
    }

    /// Writes both index files into `day_dir` and returns their paths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] if either file cannot be written.
    pub fn write_indexes(&self, day_dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let csv_path = day_dir.join(INDEX_CSV);
        let json_path = day_dir.join(INDEX_JSON);
        self.write_csv(&csv_path)?;
        self.write_json(&json_path)?;
        debug!(
            path = %day_dir.display(),
            records = self.records.len(),
            "indexes written"
        );
        Ok((csv_path, json_path))
    }

    /// Rebuilds an index from the `.eml` files already saved in a day
    /// directory.
    ///
    /// The UID comes from the numeric prefix of each file name; files
    /// without one are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a folder directory or message file cannot be read.
    pub fn load_from_directory(day_dir: &Path, folders: &[String]) -> Result<Self> {
        let mut indexer = Self::new();

        for folder in folders {
            for path in saved_messages(day_dir, folder)? {
                let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(uid) = uid_from_filename(filename) else {
                    warn!(file = %path.display(), "skipping message without uid prefix");
                    continue;
                };
                let raw = std::fs::read(&path).map_err(|e| Error::storage(&path, e))?;
                indexer.add_message(folder, uid, filename, &raw);
            }
        }

        debug!(
            path = %day_dir.display(),
            records = indexer.len(),
            "index rebuilt from disk"
        );
        Ok(indexer)
    }
}

fn uid_from_filename(filename: &str) -> Option<u32> {
    filename.split_once('_')?.0.parse().ok()
}

fn index_error(path: &Path, error: &std::io::Error) -> Error {
    Error::Index(format!("{}: {error}", path.display()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn message(subject: &str) -> Vec<u8> {
        format!(
            "From: mittente@pec.it\r\nTo: a@pec.it\r\nSubject: {subject}\r\n\
             Date: Mon, 15 Jan 2024 10:30:00 +0100\r\nMessage-ID: <{subject}@pec.it>\r\n\r\nbody\r\n"
        )
        .into_bytes()
    }

    #[test]
    fn test_stats_count_per_folder() {
        let mut indexer = Indexer::new();
        indexer.add_message("INBOX", 1, "1_a.eml", &message("a"));
        indexer.add_message("INBOX", 2, "2_b.eml", &message("b"));
        indexer.add_message("Posta_inviata", 1, "1_c.eml", &message("c"));

        let stats = indexer.stats();
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.folders["INBOX"], 2);
        assert_eq!(stats.folders["Posta_inviata"], 1);
        let expected: u64 = ["a", "b", "c"].iter().map(|s| message(s).len() as u64).sum();
        assert_eq!(stats.total_size_bytes, expected);
    }

    #[test]
    fn test_duplicate_uid_replaces_record() {
        let mut indexer = Indexer::new();
        indexer.add_message("INBOX", 1, "1_a.eml", &message("a"));
        indexer.add_message("INBOX", 1, "1_b.eml", &message("b"));
        indexer.add_message("Other", 1, "1_a.eml", &message("a"));

        assert_eq!(indexer.len(), 2);
        assert_eq!(indexer.records()[0].subject, "b");
        assert_eq!(indexer.stats().total_messages, 2);
    }

    #[test]
    fn test_write_json_ordered_with_filepath() {
        let tmp = tempfile::tempdir().unwrap();
        let mut indexer = Indexer::new();
        indexer.add_message("Posta inviata", 3, "3_c.eml", &message("c"));
        indexer.add_message("INBOX", 9, "9_b.eml", &message("b"));
        indexer.add_message("INBOX", 2, "2_a.eml", &message("a"));

        let (_, json_path) = indexer.write_indexes(tmp.path()).unwrap();
        let records: Vec<MessageRecord> =
            serde_json::from_slice(&std::fs::read(json_path).unwrap()).unwrap();

        let order: Vec<_> = records.iter().map(|r| (r.folder.as_str(), r.uid)).collect();
        assert_eq!(order, vec![("INBOX", 2), ("INBOX", 9), ("Posta inviata", 3)]);
        assert_eq!(records[2].filepath, "Posta_inviata/3_c.eml");
        assert_eq!(records[0].date, "2024-01-15T10:30:00+01:00");
    }

    #[test]
    fn test_write_csv_header_and_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let mut indexer = Indexer::new();
        indexer.add_message("INBOX", 1, "1_a.eml", &message("Fattura, gennaio"));

        let (csv_path, _) = indexer.write_indexes(tmp.path()).unwrap();
        let text = std::fs::read_to_string(csv_path).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "uid,folder,filename,subject,from,to,cc,date,message_id,size"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,INBOX,1_a.eml,\"Fattura, gennaio\",mittente@pec.it,a@pec.it,,"));
        assert!(!row.contains("INBOX/1_a.eml"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_empty_indexer_writes_header_only() {
        let tmp = tempfile::tempdir().unwrap();
        let indexer = Indexer::new();
        let (csv_path, json_path) = indexer.write_indexes(tmp.path()).unwrap();

        assert_eq!(std::fs::read_to_string(csv_path).unwrap().lines().count(), 1);
        let json: Vec<MessageRecord> =
            serde_json::from_slice(&std::fs::read(json_path).unwrap()).unwrap();
        assert!(json.is_empty());
    }

    #[tokio::test]
    async fn test_load_from_directory() {
        let tmp = tempfile::tempdir().unwrap();
        Storage::save_eml(tmp.path(), "INBOX", 4, Some("a"), &message("a"))
            .await
            .unwrap();
        Storage::save_eml(tmp.path(), "Posta inviata", 5, Some("b"), &message("b"))
            .await
            .unwrap();
        std::fs::write(tmp.path().join("INBOX").join("stray.eml"), b"x").unwrap();

        let folders = vec!["INBOX".to_string(), "Posta inviata".to_string()];
        let indexer = Indexer::load_from_directory(tmp.path(), &folders).unwrap();

        assert_eq!(indexer.len(), 2);
        assert_eq!(indexer.records()[0].uid, 4);
        assert_eq!(indexer.records()[1].folder, "Posta inviata");
        assert_eq!(indexer.records()[1].filepath, "Posta_inviata/5_b.eml");
    }

    #[test]
    fn test_uid_from_filename() {
        assert_eq!(uid_from_filename("12_no_subject.eml"), Some(12));
        assert_eq!(uid_from_filename("stray.eml"), None);
        assert_eq!(uid_from_filename("x_1.eml"), None);
    }
}
