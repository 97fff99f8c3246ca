//! Header extraction for index records.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use mailparse::MailHeaderMap;

/// Decoded headers of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    /// Decoded `Subject`.
    pub subject: Option<String>,
    /// Decoded `From`.
    pub from: String,
    /// Decoded `To`.
    pub to: String,
    /// Decoded `Cc`.
    pub cc: String,
    /// Parsed `Date`, keeping the sender's offset.
    pub date: Option<DateTime<FixedOffset>>,
    /// `Message-ID` as written.
    pub message_id: String,
}

impl MessageHeaders {
    /// Extracts the indexed headers from raw message bytes.
    ///
    /// Encoded words (RFC 2047) are decoded, including mixed charsets in one
    /// header. Headers that cannot be parsed at all fall back to a lossy
    /// line scan so a damaged message still gets a usable record.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        match mailparse::parse_headers(raw) {
            Ok((headers, _)) => {
                let get = |name: &str| headers.get_first_value(name);
                Self::from_lookup(get)
            }
            Err(e) => {
                tracing::debug!(error = %e, "header parse failed, using lossy scan");
                let fallback = lossy_headers(raw);
                Self::from_lookup(|name| {
                    fallback
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(name))
                        .map(|(_, value)| value.clone())
                })
            }
        }
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let clean = |value: Option<String>| value.map(|v| v.trim().to_string()).unwrap_or_default();

        Self {
            subject: get("Subject").map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            from: clean(get("From")),
            to: clean(get("To")),
            cc: clean(get("Cc")),
            date: get("Date").as_deref().and_then(parse_date),
            message_id: clean(get("Message-ID")),
        }
    }

    /// `Date` as RFC 3339, or empty when absent or unparseable.
    #[must_use]
    pub fn date_rfc3339(&self) -> String {
        self.date.map(|d| d.to_rfc3339()).unwrap_or_default()
    }
}

/// Parses a `Date` header, keeping its offset when the value is strict
/// RFC 2822 and falling back to the lenient parser in UTC otherwise.
fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date);
    }
    let timestamp = mailparse::dateparse(value).ok()?;
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|d| d.fixed_offset())
}

/// Splits the header block into unfolded `(name, value)` pairs.
fn lossy_headers(raw: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(raw);
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    headers
}
