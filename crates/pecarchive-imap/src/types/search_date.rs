//! Date argument for `SEARCH ON`.

use chrono::{Datelike, NaiveDate};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A calendar day in the server's `date` syntax (`15-Jan-2024`).
///
/// The month name is always English regardless of process locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchDate(NaiveDate);

impl SearchDate {
    /// Wraps a calendar date.
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Returns the wrapped date.
    #[must_use]
    pub const fn date(self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for SearchDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl std::fmt::Display for SearchDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let month = MONTHS[self.0.month0() as usize];
        write!(f, "{}-{}-{:04}", self.0.day(), month, self.0.year())
    }
}
