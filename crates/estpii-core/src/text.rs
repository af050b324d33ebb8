//! Character offset indexing
//!
//! Spans are expressed in Unicode scalar (character) offsets, while the regex
//! engine and Rust string slicing work on byte offsets. `TextIndex` converts
//! between the two for a single input text.

/// Byte/char offset translation table for one text
#[derive(Debug, Clone)]
pub struct TextIndex<'a> {
    text: &'a str,
    /// Byte offset of every char boundary; empty for pure ASCII text
    boundaries: Vec<usize>,
}

impl<'a> TextIndex<'a> {
    /// Build an index over `text`
    pub fn new(text: &'a str) -> Self {
        let boundaries = if text.is_ascii() {
            Vec::new()
        } else {
            text.char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(text.len()))
                .collect()
        };

        Self { text, boundaries }
    }

    /// The indexed text
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Number of characters in the text
    pub fn char_len(&self) -> usize {
        if self.boundaries.is_empty() {
            self.text.len()
        } else {
            self.boundaries.len() - 1
        }
    }

    /// Convert a byte offset on a char boundary into a char offset
    pub fn char_offset(&self, byte: usize) -> Option<usize> {
        if self.boundaries.is_empty() {
            return (byte <= self.text.len()).then_some(byte);
        }
        self.boundaries.binary_search(&byte).ok()
    }

    /// Convert a char offset into a byte offset
    pub fn byte_offset(&self, char_offset: usize) -> Option<usize> {
        if self.boundaries.is_empty() {
            return (char_offset <= self.text.len()).then_some(char_offset);
        }
        self.boundaries.get(char_offset).copied()
    }

    /// Convert a byte range into a char range
    pub fn char_range(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        Some((self.char_offset(start)?, self.char_offset(end)?))
    }

    /// Slice the text by char offsets
    pub fn slice(&self, start: usize, end: usize) -> Option<&'a str> {
        if start > end {
            return None;
        }
        let from = self.byte_offset(start)?;
        let to = self.byte_offset(end)?;
        self.text.get(from..to)
    }
}
