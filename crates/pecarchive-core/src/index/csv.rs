//! Minimal RFC 4180 writer for `index.csv`.

use std::io::{self, Write};

/// Column header row.
pub const HEADER: [&str; 10] = [
    "uid",
    "folder",
    "filename",
    "subject",
    "from",
    "to",
    "cc",
    "date",
    "message_id",
    "size",
];

fn needs_quoting(field: &str) -> bool {
    field.contains([',', '"', '\r', '\n'])
}

/// Writes one CRLF-terminated row, quoting fields that need it.
pub fn write_row<W: Write, S: AsRef<str>>(out: &mut W, fields: &[S]) -> io::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        let field = field.as_ref();
        if needs_quoting(field) {
            write!(out, "\"{}\"", field.replace('"', "\"\""))?;
        } else {
            out.write_all(field.as_bytes())?;
        }
    }
    out.write_all(b"\r\n")
}
