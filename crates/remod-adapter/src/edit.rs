//! Range-based text edits.
//!
//! Engines that locate matches by byte offset collect [`TextEdit`]s against
//! the original text and apply them all at once with [`apply_edits`]. Edits
//! are spliced in descending start order so that applying one never shifts
//! the offsets of another that is still pending.

use remod_types::ErrorCode;
use thiserror::Error;

/// Replace the byte range `start..end` with `replacement`.
///
/// An insertion is an edit with `start == end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl TextEdit {
    pub fn new(start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::new(at, at, text)
    }

    pub fn delete(start: usize, end: usize) -> Self {
        Self::new(start, end, String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("edit {start}..{end} is outside the text (length {len})")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("edit offset {offset} is not on a character boundary")]
    NotCharBoundary { offset: usize },

    #[error("edits {}..{} and {}..{} overlap", first.0, first.1, second.0, second.1)]
    Overlap {
        first: (usize, usize),
        second: (usize, usize),
    },
}

impl ErrorCode for EditError {
    fn code(&self) -> &'static str {
        match self {
            Self::OutOfBounds { .. } => "EDIT_OUT_OF_BOUNDS",
            Self::NotCharBoundary { .. } => "EDIT_NOT_CHAR_BOUNDARY",
            Self::Overlap { .. } => "EDIT_OVERLAP",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Applies `edits` to `source`.
///
/// All offsets refer to `source` as given. Insertions at the same offset
/// keep the order they were supplied in.
///
/// # Errors
///
/// Fails when an edit is out of range, splits a UTF-8 character, or
/// overlaps another edit.
///
/// ```
/// use remod_adapter::{apply_edits, TextEdit};
///
/// let out = apply_edits(
///     "let a = b;",
///     vec![TextEdit::new(8, 9, "c"), TextEdit::new(4, 5, "x")],
/// )
/// .unwrap();
/// assert_eq!(out, "let x = c;");
/// ```
pub fn apply_edits(
    source: &str,
    edits: impl IntoIterator<Item = TextEdit>,
) -> Result<String, EditError> {
    let mut ordered: Vec<(usize, TextEdit)> = edits.into_iter().enumerate().collect();

    for (_, edit) in &ordered {
        if edit.start > edit.end || edit.end > source.len() {
            return Err(EditError::OutOfBounds {
                start: edit.start,
                end: edit.end,
                len: source.len(),
            });
        }
        for offset in [edit.start, edit.end] {
            if !source.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }
    }

    ordered.sort_by_key(|(index, edit)| (edit.start, edit.end, *index));

    for pair in ordered.windows(2) {
        let (a, b) = (&pair[0].1, &pair[1].1);
        if a.end > b.start {
            return Err(EditError::Overlap {
                first: (a.start, a.end),
                second: (b.start, b.end),
            });
        }
    }

    let mut out = source.to_string();
    for (_, edit) in ordered.iter().rev() {
        out.replace_range(edit.start..edit.end, &edit.replacement);
    }
    Ok(out)
}
