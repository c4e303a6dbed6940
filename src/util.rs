//! Small helpers shared across sift components.

pub mod levenshtein;
pub mod text;
