//! Query-term highlighting of text snippets.
//!
//! [`Highlighter`] strips markup from a text block, picks the window of
//! `max_length` bytes holding the most query words and wraps every query
//! word inside it in an HTML tag.
//!
//! ```
//! use sift::highlight::Highlighter;
//!
//! let highlighter = Highlighter::new("rust").max_length(40);
//! assert_eq!(
//!     highlighter.highlight("<p>Rust is fast.</p>"),
//!     "<span class=\"highlighted\">Rust</span> is fast."
//! );
//! ```

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TAG_REGEX: Regex = Regex::new(r"<[^>]*?>").expect("tag pattern is valid");
}

const DEFAULT_MAX_LENGTH: usize = 200;

/// Highlights the words of a query in text blocks.
#[derive(Debug, Clone)]
pub struct Highlighter {
    query_words: BTreeSet<String>,
    max_length: usize,
    html_tag: String,
    css_class: Option<String>,
}

impl Highlighter {
    /// Create a highlighter for the words of `query`.
    ///
    /// Words starting with `-` are exclusions and never highlighted.
    pub fn new(query: &str) -> Self {
        let query_words = query
            .split_whitespace()
            .filter(|word| !word.starts_with('-'))
            .map(str::to_lowercase)
            .collect();

        Highlighter {
            query_words,
            max_length: DEFAULT_MAX_LENGTH,
            html_tag: "span".to_string(),
            css_class: Some("highlighted".to_string()),
        }
    }

    /// Set the snippet length in bytes.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn html_tag<S: Into<String>>(mut self, html_tag: S) -> Self {
        self.html_tag = html_tag.into();
        self
    }

    /// Set the class of the wrapping tag, `None` for a bare tag.
    pub fn css_class<S: Into<String>>(mut self, css_class: Option<S>) -> Self {
        self.css_class = css_class.map(Into::into);
        self
    }

    pub fn query_words(&self) -> impl Iterator<Item = &str> {
        self.query_words.iter().map(String::as_str)
    }

    /// Render the best snippet of `text_block` with query words wrapped.
    pub fn highlight(&self, text_block: &str) -> String {
        let text = TAG_REGEX.replace_all(text_block, "");
        let locations = self.find_highlightable_words(&text);
        let (start, end) = self.find_window(&locations);
        self.render_html(&text, start, end)
    }

    /// Byte offsets of every query word in `text`, ignoring case.
    pub fn find_highlightable_words(&self, text: &str) -> Vec<(String, Vec<usize>)> {
        self.query_words
            .iter()
            .map(|word| {
                let offsets = word_regex(word)
                    .map(|re| re.find_iter(text).map(|m| m.start()).collect())
                    .unwrap_or_default();
                (word.clone(), offsets)
            })
            .collect()
    }

    /// The window holding the most query words, earliest first on ties.
    pub fn find_window(&self, locations: &[(String, Vec<usize>)]) -> (usize, usize) {
        let mut found: Vec<usize> = locations
            .iter()
            .flat_map(|(_, offsets)| offsets.iter().copied())
            .collect();
        found.sort_unstable();

        match found.as_slice() {
            [] => (0, self.max_length),
            [only] => (*only, only.saturating_add(self.max_length)),
            _ => {
                let mut best_start = 0;
                let mut highest_density = 0;
                for (i, start) in found.iter().enumerate() {
                    let density = 1 + found[i + 1..]
                        .iter()
                        .take_while(|end| *end - start < self.max_length)
                        .count();
                    if density > highest_density {
                        best_start = *start;
                        highest_density = density;
                    }
                }
                (best_start, best_start.saturating_add(self.max_length))
            }
        }
    }

    fn render_html(&self, text: &str, start: usize, end: usize) -> String {
        let start = floor_char_boundary(text, start.min(text.len()));
        let end = floor_char_boundary(text, end.min(text.len()));
        let chunk = &text[start..end.max(start)];

        let open = match &self.css_class {
            Some(css_class) => format!("<{} class=\"{css_class}\">", self.html_tag),
            None => format!("<{}>", self.html_tag),
        };
        let close = format!("</{}>", self.html_tag);

        let mut highlighted = match self.words_regex() {
            Some(re) => {
                let mut rendered = String::with_capacity(chunk.len());
                let mut copied = 0;
                for m in re.find_iter(chunk) {
                    rendered.push_str(&chunk[copied..m.start()]);
                    rendered.push_str(&open);
                    rendered.push_str(m.as_str());
                    rendered.push_str(&close);
                    copied = m.end();
                }
                rendered.push_str(&chunk[copied..]);
                rendered
            }
            None => chunk.to_string(),
        };

        if start > 0 {
            highlighted.insert_str(0, "...");
        }
        if end < text.len() {
            highlighted.push_str("...");
        }
        highlighted
    }

    /// One case-insensitive alternation of all query words, longest first.
    fn words_regex(&self) -> Option<Regex> {
        if self.query_words.is_empty() {
            return None;
        }
        let mut words: Vec<&String> = self.query_words.iter().collect();
        words.sort_by_key(|word| std::cmp::Reverse(word.len()));
        let alternation: Vec<String> = words.iter().map(|word| regex::escape(word)).collect();
        Regex::new(&format!("(?i){}", alternation.join("|")))
            .map_err(|e| log::warn!("cannot highlight {words:?}: {e}"))
            .ok()
    }
}

fn word_regex(word: &str) -> Option<Regex> {
    Regex::new(&format!("(?i){}", regex::escape(word)))
        .map_err(|e| log::warn!("cannot highlight '{word}': {e}"))
        .ok()
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT_1: &str = "This is a test of the highlightable words detection. This is only a test. Were this an actual emergency, your text would have exploded in mid-air.";
    const DOCUMENT_2: &str = "The content of words in no particular order causes nothing to occur.";

    #[test]
    fn test_query_words() {
        let highlighter = Highlighter::new("this test -excluded");
        assert_eq!(highlighter.query_words().collect::<Vec<_>>(), vec!["test", "this"]);
    }

    #[test]
    fn test_find_highlightable_words() {
        let highlighter = Highlighter::new("this test");
        assert_eq!(
            highlighter.find_highlightable_words(DOCUMENT_1),
            vec![
                ("test".to_string(), vec![10, 68]),
                ("this".to_string(), vec![0, 53, 79]),
            ]
        );

        let highlighter = Highlighter::new("content detection");
        assert_eq!(
            highlighter.find_highlightable_words(DOCUMENT_2),
            vec![
                ("content".to_string(), vec![4]),
                ("detection".to_string(), vec![]),
            ]
        );
    }

    #[test]
    fn test_find_window() {
        let highlighter = Highlighter::new("this test");
        assert_eq!(highlighter.find_window(&[]), (0, 200));

        let locations = highlighter.find_highlightable_words(DOCUMENT_1);
        assert_eq!(highlighter.find_window(&locations), (0, 200));

        let highlighter = Highlighter::new("this test").max_length(30);
        let locations = highlighter.find_highlightable_words(DOCUMENT_1);
        assert_eq!(highlighter.find_window(&locations), (53, 83));

        let highlighter = Highlighter::new("detection").max_length(20);
        let locations = highlighter.find_highlightable_words(DOCUMENT_1);
        assert_eq!(highlighter.find_window(&locations), (42, 62));
    }

    #[test]
    fn test_unbounded_window() {
        let highlighter = Highlighter::new("detection").max_length(usize::MAX);
        let locations = highlighter.find_highlightable_words(DOCUMENT_1);
        assert_eq!(highlighter.find_window(&locations), (42, usize::MAX));
        assert_eq!(
            highlighter.highlight(DOCUMENT_1),
            format!("...<span class=\"highlighted\">detection</span>{}", &DOCUMENT_1[51..])
        );

        let highlighter = Highlighter::new("this test").max_length(usize::MAX);
        let locations = highlighter.find_highlightable_words(DOCUMENT_1);
        assert_eq!(highlighter.find_window(&locations), (0, usize::MAX));
    }

    #[test]
    fn test_highlight() {
        let highlighter = Highlighter::new("this test");
        assert_eq!(
            highlighter.highlight(DOCUMENT_1),
            "<span class=\"highlighted\">This</span> is a <span class=\"highlighted\">test</span> \
             of the highlightable words detection. <span class=\"highlighted\">This</span> is \
             only a <span class=\"highlighted\">test</span>. Were <span class=\"highlighted\">this</span> \
             an actual emergency, your text would have exploded in mid-air."
        );

        let highlighter = Highlighter::new("detection").max_length(20);
        assert_eq!(
            highlighter.highlight(DOCUMENT_1),
            "...<span class=\"highlighted\">detection</span>. This is o..."
        );

        let highlighter = Highlighter::new("content")
            .html_tag("div")
            .css_class(None::<String>)
            .max_length(30);
        assert_eq!(
            highlighter.highlight(DOCUMENT_2),
            "...<div>content</div> of words in no particu..."
        );
    }

    #[test]
    fn test_highlight_strips_tags_and_respects_char_boundaries() {
        let highlighter = Highlighter::new("café").max_length(5);
        assert_eq!(
            highlighter.highlight("<b>Un café</b> noir"),
            "...<span class=\"highlighted\">café</span>..."
        );
        let highlighter = Highlighter::new("un").max_length(7);
        assert_eq!(
            highlighter.highlight("Un café"),
            "<span class=\"highlighted\">Un</span> caf..."
        );
        assert_eq!(Highlighter::new("").highlight("<i>plain</i>"), "plain");
    }
}
