//! Word tokenization shared by the memory backend and the highlighter.

use unicode_segmentation::UnicodeSegmentation;

/// Lowercased words of `text` by Unicode word boundaries.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

/// Words of `text` with their byte offsets, original case preserved.
pub fn word_offsets(text: &str) -> Vec<(usize, &str)> {
    text.unicode_word_indices().collect()
}
