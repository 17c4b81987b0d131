//! Text normalization for the lexical corpus.
//!
//! Search documents concatenate five fields in a fixed order:
//! 1. title (normalized)
//! 2. genre (lowercased only)
//! 3. description (normalized)
//! 4. director (lowercased only)
//! 5. actors (lowercased only)

use once_cell::sync::Lazy;
use regex::Regex;

use crate::catalog::{Catalog, MovieRecord};

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// Tokens of this many characters or fewer are dropped.
const MIN_TOKEN_CHARS: usize = 2;

/// Lowercase, replace punctuation with spaces, drop tokens of two characters
/// or fewer, and rejoin with single spaces.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    NON_WORD
        .replace_all(&lowered, " ")
        .split_whitespace()
        .filter(|token| token.chars().count() > MIN_TOKEN_CHARS)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn search_document(movie: &MovieRecord) -> String {
    [
        normalize_text(&movie.title),
        movie.genre_text().to_lowercase(),
        normalize_text(&movie.description),
        movie.director_text().to_lowercase(),
        movie.actors_text().to_lowercase(),
    ]
    .join(" ")
}

/// One search document per movie, in catalog order.
pub fn build_corpus(catalog: &Catalog) -> Vec<String> {
    catalog.movies().iter().map(search_document).collect()
}

/// Query text as fed to the vectorizer.
///
/// With `normalize` off the query is only lowercased, which is what the
/// ranker has always done.
pub fn prepare_query(query: &str, normalize: bool) -> String {
    if normalize {
        normalize_text(query)
    } else {
        query.to_lowercase()
    }
}
