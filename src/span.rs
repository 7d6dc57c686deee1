//! Annotated spans (spec.md §6): the external-interface type the caller
//! uses to mark phrase-fix ranges, HTML-tag deletions, and inline-fix
//! replacements before handing a line to the pre-tokenizer.

/// How a class span's index should be encoded, configured once per model
/// (spec.md §4.1, §4.5); the pre-tokenizer itself stays agnostic to which
/// mode is active by delegating the choice to the caller via
/// `ClassSpanMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassSpanMode {
    /// Emit a single class token with an `index` factor (or digit-encoded
    /// index), and resolve its surface form from `decodeAs` at decode
    /// time.
    Replaced,
    /// Emit a source/target pseudo-token pair tagged `inlineFix=WHAT`/
    /// `inlineFix=WITH` (or `<IOPEN>`/`<IDELIM>`/`<ICLOSE>` tags).
    InlineFix,
}

/// A single annotated span over the input line (spec.md §6).
#[derive(Debug, Clone)]
pub struct AnnotatedSpan {
    /// Byte offset into the line where the span starts.
    pub start_index: usize,
    /// Byte length of the span.
    pub length: usize,
    /// Present for phrase-fix/inline-fix spans; `None` for plain deletions
    /// (e.g. HTML tags marked `encode_as_if = Some("")`).
    pub class_type: Option<String>,
    /// Opaque caller instructions, passed through unmodified.
    pub instructions: String,
    /// The surface form to substitute at decode time (phrase-fix) or the
    /// inline-fix target text.
    pub decode_as: Option<String>,
    /// Replaces the underlying string for this range while the original
    /// range is preserved; `Some("")` deletes the span (HTML tags).
    pub encode_as_if: Option<String>,
}

impl AnnotatedSpan {
    #[must_use]
    pub fn end(&self) -> usize {
        self.start_index + self.length
    }

    /// True for a pure deletion: no class and an empty substitute string.
    #[must_use]
    pub fn is_pure_deletion(&self) -> bool {
        self.class_type.is_none() && self.encode_as_if.as_deref() == Some("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_deletion_detects_html_tag_spans() {
        let span = AnnotatedSpan {
            start_index: 4,
            length: 3,
            class_type: None,
            instructions: String::new(),
            decode_as: None,
            encode_as_if: Some(String::new()),
        };
        assert!(span.is_pure_deletion());
    }

    #[test]
    fn phrase_fix_span_is_not_a_pure_deletion() {
        let span = AnnotatedSpan {
            start_index: 12,
            length: 14,
            class_type: Some("phrasefix".to_string()),
            instructions: String::new(),
            decode_as: Some("First Class".to_string()),
            encode_as_if: None,
        };
        assert!(!span.is_pure_deletion());
    }
}
