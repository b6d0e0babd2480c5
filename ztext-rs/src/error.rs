//! Error types.
//!
//! Every fallible operation returns an error *value*; the library never
//! panics on bad input.  [`ZTextError`] carries a stable numeric code
//! (see [`ZTextError::code`]) so hosts can match on errors across FFI or
//! serialisation boundaries without depending on enum ordering.

use thiserror::Error;

/// All error conditions reported by the parser, the element tree, and the
/// context operations.
///
/// Code `0` ("no error") is represented by `Ok`; it has no variant here.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZTextError {
    /// A parameter is invalid (absent element, stale id, empty name).
    #[error("a parameter is invalid")]
    InvalidParameter,
    /// The element chain is already linked into another chain or tree.
    #[error("the element is already in use by another chain")]
    ElementInUse,
    /// The element is not a Command element.
    #[error("the element is not a command element")]
    ElementTypeNotCommand,
    /// The element is not a Text element.
    #[error("the element is not a text element")]
    ElementTypeNotText,
    /// The element is not a Variable element.
    #[error("the element is not a variable element")]
    ElementTypeNotVariable,
    /// A token name contains a character outside `[A-Za-z0-9_]`.
    #[error("the token name contains an invalid character")]
    TokenNameInvalid,
    /// The parser found no text in the requested range.  Internal signal;
    /// the document parser converts this into an empty Text element.
    #[error("no text was found")]
    NoTextFound,
    /// A `{{` was opened but the matching `}}` is missing.
    #[error("the token end marker '}}}}' is missing")]
    TokenEndMissing,
    /// A `{{` is immediately followed by `$`, `(`, or `}}`.
    #[error("the token name is missing")]
    TokenNameMissing,
    /// Reserved; not produced by the current grammar.
    #[error("the token identifier is invalid")]
    TokenIdentifierInvalid,
    /// A `}}` appeared with no preceding `{{`.
    #[error("the token begin marker '{{{{' is missing")]
    TokenBeginMissing,
    /// A command property list was opened with `(` but never closed.
    #[error("the command property end marker ')' is missing")]
    PropertyEndMissing,
    /// The property map does not start with `(`.
    #[error("the map begin marker '(' is missing")]
    MapBeginMissing,
    /// The property map does not end with `)`.
    #[error("the map end marker ')' is missing")]
    MapEndMissing,
    /// A property map segment has no `key=value` pair.
    #[error("the map key/value pair is missing")]
    MapKeyValuePairMissing,
    /// A property map pair has an empty key.
    #[error("the map key is missing")]
    MapKeyMissing,
    /// A property map pair has an empty value.
    #[error("the map value is missing")]
    MapValueMissing,
}

impl ZTextError {
    /// Stable numeric code for this error.
    pub fn code(self) -> u8 {
        match self {
            ZTextError::InvalidParameter => 1,
            ZTextError::ElementInUse => 2,
            ZTextError::ElementTypeNotCommand => 3,
            ZTextError::ElementTypeNotText => 4,
            ZTextError::ElementTypeNotVariable => 5,
            ZTextError::TokenNameInvalid => 6,
            ZTextError::NoTextFound => 7,
            ZTextError::TokenEndMissing => 8,
            ZTextError::TokenNameMissing => 9,
            ZTextError::TokenIdentifierInvalid => 10,
            ZTextError::TokenBeginMissing => 11,
            ZTextError::PropertyEndMissing => 12,
            ZTextError::MapBeginMissing => 13,
            ZTextError::MapEndMissing => 14,
            ZTextError::MapKeyValuePairMissing => 15,
            ZTextError::MapKeyMissing => 16,
            ZTextError::MapValueMissing => 17,
        }
    }
}

/// A parse failure together with the byte offset where it was detected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{error} (offset {offset})")]
pub struct ParseError {
    /// What went wrong.
    pub error: ZTextError,
    /// Byte offset into the source string where the failure was detected.
    pub offset: usize,
}

impl ParseError {
    pub fn new(error: ZTextError, offset: usize) -> Self {
        Self { error, offset }
    }

    /// Stable numeric code of the underlying [`ZTextError`].
    pub fn code(&self) -> u8 {
        self.error.code()
    }

    /// Render a three-line report against the source that failed to parse:
    /// a `Line/Char/Error` summary, the offending source line, and a caret
    /// under the failing column.
    pub fn report(&self, source: &str) -> String {
        let bytes = source.as_bytes();
        let offset = self.offset.min(source.len());

        let mut line_count = 1;
        let mut line_start = 0;
        for (i, &b) in bytes.iter().enumerate().take(offset) {
            if b == b'\n' {
                line_count += 1;
                line_start = i + 1;
            }
        }

        while line_start < bytes.len() && bytes[line_start].is_ascii_whitespace() {
            line_start += 1;
        }

        let mut line_end = line_start;
        while line_end < bytes.len() && bytes[line_end] != b'\n' {
            line_end += 1;
        }

        let column = offset.saturating_sub(line_start) + 1;

        format!(
            "Line: {}, Char: {}, Error: {}\n{}\n{:>width$}",
            line_count,
            offset,
            self.error,
            &source[line_start..line_end],
            "^",
            width = column,
        )
    }
}

impl From<ZTextError> for ParseError {
    fn from(error: ZTextError) -> Self {
        Self { error, offset: 0 }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
