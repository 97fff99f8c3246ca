//! Filesystem-safe names for untrusted components.

/// Longest sanitized name, in characters.
const MAX_NAME_CHARS: usize = 200;

/// Longest subject fragment embedded in a message filename, in characters.
const MAX_SUBJECT_CHARS: usize = 50;

/// Placeholder used when a message has no usable subject.
const NO_SUBJECT: &str = "no_subject";

const fn is_reserved(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
}

const fn is_control(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{1f}' | '\u{7f}')
}

/// Replaces reserved characters with `_`, drops control characters, and
/// caps the result at 200 characters.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|&c| !is_control(c))
        .map(|c| if is_reserved(c) { '_' } else { c })
        .take(MAX_NAME_CHARS)
        .collect()
}

/// Directory name for a server folder: spaces and reserved characters
/// become `_`.
///
/// Names made only of dots are neutralized so a folder can never resolve to
/// the day directory or its parent.
#[must_use]
pub fn sanitize_folder_name(folder: &str) -> String {
    let name: String = folder
        .chars()
        .filter(|&c| !is_control(c))
        .map(|c| if c == ' ' || is_reserved(c) { '_' } else { c })
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        "_".repeat(name.len().max(1))
    } else {
        name
    }
}

/// `<uid>_<subject>.eml`, with the subject sanitized and cut to 50
/// characters.
#[must_use]
pub fn message_filename(uid: u32, subject: Option<&str>) -> String {
    let fragment: String = subject
        .map(sanitize_filename)
        .unwrap_or_default()
        .chars()
        .take(MAX_SUBJECT_CHARS)
        .collect();

    if fragment.trim().is_empty() {
        format!("{uid}_{NO_SUBJECT}.eml")
    } else {
        format!("{uid}_{fragment}.eml")
    }
}
