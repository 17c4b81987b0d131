//! Keyword search over the catalog.
//!
//! Movies are turned into search documents, weighted with TF-IDF and ranked
//! by cosine similarity to the query. The fitted model and weight matrix are
//! cached on disk, keyed by a hash of the corpus.

pub mod cache;
pub mod index;
pub mod normalize;
pub mod vectorizer;

pub use cache::IndexCache;
pub use index::{IndexSource, IndexStatus, LexicalIndex};
