//! Index record types.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::headers::MessageHeaders;
use crate::storage::sanitize_folder_name;

/// One archived message as listed in `index.csv` and `index.json`.
///
/// `uid` is written to JSON as a number. Indexes that carry it as a
/// string are still read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Server UID.
    #[serde(deserialize_with = "uid_from_number_or_string")]
    pub uid: u32,
    /// Server folder name, as configured.
    pub folder: String,
    /// File name inside the folder directory.
    pub filename: String,
    /// Decoded subject, empty when absent.
    #[serde(default)]
    pub subject: String,
    /// Decoded sender.
    #[serde(default)]
    pub from: String,
    /// Decoded recipients.
    #[serde(default)]
    pub to: String,
    /// Decoded carbon-copy recipients.
    #[serde(default)]
    pub cc: String,
    /// RFC 3339 timestamp from the `Date` header, empty when unknown.
    #[serde(default)]
    pub date: String,
    /// `Message-ID` header.
    #[serde(default)]
    pub message_id: String,
    /// Raw message size in bytes.
    #[serde(default)]
    pub size: u64,
    /// `<folder-dir>/<filename>`, relative to the day directory.
    #[serde(default)]
    pub filepath: String,
}

impl MessageRecord {
    /// Builds a record from the raw bytes that were saved as `filename`.
    #[must_use]
    pub fn from_raw(folder: &str, uid: u32, filename: &str, raw: &[u8]) -> Self {
        Self::from_headers(folder, uid, filename, MessageHeaders::parse(raw), raw.len() as u64)
    }

    /// Builds a record from headers that were already decoded.
    #[must_use]
    pub fn from_headers(
        folder: &str,
        uid: u32,
        filename: &str,
        headers: MessageHeaders,
        size: u64,
    ) -> Self {
        let date = headers.date_rfc3339();
        Self {
            uid,
            folder: folder.to_string(),
            filename: filename.to_string(),
            subject: headers.subject.unwrap_or_default(),
            from: headers.from,
            to: headers.to,
            cc: headers.cc,
            date,
            message_id: headers.message_id,
            size,
            filepath: format!("{}/{filename}", sanitize_folder_name(folder)),
        }
    }

    /// CSV cells in column order. `filepath` is JSON-only.
    pub(crate) fn csv_fields(&self) -> [String; 10] {
        [
            self.uid.to_string(),
            self.folder.clone(),
            self.filename.clone(),
            self.subject.clone(),
            self.from.clone(),
            self.to.clone(),
            self.cc.clone(),
            self.date.clone(),
            self.message_id.clone(),
            self.size.to_string(),
        ]
    }
}

fn uid_from_number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Uid {
        Number(u32),
        Text(String),
    }

    match Uid::deserialize(deserializer)? {
        Uid::Number(uid) => Ok(uid),
        Uid::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Totals over one day's records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of indexed messages.
    pub total_messages: u64,
    /// Sum of raw message sizes.
    pub total_size_bytes: u64,
    /// Message count per folder. Folders with no messages are absent.
    pub folders: BTreeMap<String, u64>,
}
