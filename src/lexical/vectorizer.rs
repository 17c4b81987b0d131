//! TF-IDF term weighting over the search corpus.
//!
//! Tokens are runs of two or more word characters in the lowercased text.
//! Inverse document frequency is smoothed (`ln((1 + n) / (1 + df)) + 1`) and
//! every row is L2-normalized, so cosine similarity between a query and a
//! document row reduces to a sparse dot product.
//!
//! When the corpus holds more distinct terms than `max_features`, only the
//! terms with the highest total count across the corpus are kept (ties broken
//! alphabetically). Column `i` of the matrix is the `i`-th term in ascending
//! order.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_FEATURES: usize = 50_000;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum VectorizerError {
    #[error("vocabulary is not strictly sorted at term {0:?}")]
    Unsorted(String),

    #[error("term {term:?} has document frequency {df}, corpus has {n_documents} documents")]
    DocumentFrequency {
        term: String,
        df: u32,
        n_documents: usize,
    },

    #[error("vocabulary has {got} terms, more than max_features {max}")]
    TooManyTerms { got: usize, max: usize },
}

/// A vocabulary term and the number of documents containing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermStat {
    pub term: String,
    pub df: u32,
}

/// Sparse row with column indices in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    #[cfg(test)]
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    pub fn as_row(&self) -> SparseRow<'_> {
        SparseRow {
            indices: &self.indices,
            values: &self.values,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    pub indices: &'a [u32],
    pub values: &'a [f32],
}

impl SparseRow<'_> {
    fn l2_norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    fn dot(&self, other: &SparseRow<'_>) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0f32;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Cosine similarity in [0, 1]; 0 when either side is the zero vector.
pub fn cosine_similarity(a: SparseRow<'_>, b: SparseRow<'_>) -> f32 {
    let norm_a = a.l2_norm();
    let norm_b = b.l2_norm();
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }
    (a.dot(&b) / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Compressed sparse row matrix, one row per document.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    pub n_cols: u32,
    pub indptr: Vec<u64>,
    pub indices: Vec<u32>,
    pub data: Vec<f32>,
}

impl CsrMatrix {
    pub fn from_rows(n_cols: u32, rows: impl IntoIterator<Item = SparseVector>) -> Self {
        let mut matrix = Self {
            n_cols,
            indptr: vec![0],
            indices: vec![],
            data: vec![],
        };
        for row in rows {
            matrix.indices.extend(row.indices);
            matrix.data.extend(row.values);
            matrix.indptr.push(matrix.indices.len() as u64);
        }
        matrix
    }

    pub fn rows(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn row(&self, idx: usize) -> Option<SparseRow<'_>> {
        let start = *self.indptr.get(idx)? as usize;
        let end = *self.indptr.get(idx + 1)? as usize;
        Some(SparseRow {
            indices: self.indices.get(start..end)?,
            values: self.data.get(start..end)?,
        })
    }

    /// Checks the structural invariants of a matrix read from disk.
    pub fn validate(&self) -> Result<(), String> {
        if self.indptr.first() != Some(&0) {
            return Err("row pointer must start at 0".to_string());
        }
        if self.indices.len() != self.data.len() {
            return Err(format!(
                "{} column indices for {} values",
                self.indices.len(),
                self.data.len()
            ));
        }
        if self.indptr.last().copied() != Some(self.data.len() as u64) {
            return Err("row pointer does not end at nnz".to_string());
        }
        for (row, window) in self.indptr.windows(2).enumerate() {
            let (start, end) = (window[0] as usize, window[1] as usize);
            if start > end || end > self.indices.len() {
                return Err(format!("row pointer out of order at row {row}"));
            }
            let cols = &self.indices[start..end];
            if cols.iter().any(|c| *c >= self.n_cols) {
                return Err(format!("column out of range in row {row}"));
            }
            if cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(format!("columns not sorted in row {row}"));
            }
        }
        Ok(())
    }
}

/// Lowercased tokens of `text`, in order of appearance.
pub fn analyze(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn count_terms(text: &str) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for token in analyze(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    max_features: usize,
    n_documents: usize,
    terms: Vec<TermStat>,
    idf: Vec<f64>,
    columns: HashMap<String, u32>,
}

impl TfidfVectorizer {
    pub fn fit(documents: &[String], max_features: usize) -> Self {
        // term -> (document frequency, total count)
        let mut stats: BTreeMap<String, (u32, u64)> = BTreeMap::new();
        for doc in documents {
            for (term, count) in count_terms(doc) {
                let entry = stats.entry(term).or_insert((0, 0));
                entry.0 += 1;
                entry.1 += u64::from(count);
            }
        }

        let mut ranked: Vec<(String, u32, u64)> = stats
            .into_iter()
            .map(|(term, (df, total))| (term, df, total))
            .collect();

        if ranked.len() > max_features {
            ranked.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
            ranked.truncate(max_features);
            ranked.sort_by(|a, b| a.0.cmp(&b.0));
        }

        let terms = ranked
            .into_iter()
            .map(|(term, df, _)| TermStat { term, df })
            .collect();

        Self::build(documents.len(), max_features, terms)
    }

    /// Fits the vectorizer and weights every document in one pass.
    pub fn fit_transform(documents: &[String], max_features: usize) -> (Self, CsrMatrix) {
        let vectorizer = Self::fit(documents, max_features);
        let matrix = vectorizer.transform_all(documents);
        (vectorizer, matrix)
    }

    /// Rebuilds a fitted vectorizer from its persisted vocabulary.
    pub fn from_parts(
        n_documents: usize,
        max_features: usize,
        terms: Vec<TermStat>,
    ) -> Result<Self, VectorizerError> {
        if terms.len() > max_features {
            return Err(VectorizerError::TooManyTerms {
                got: terms.len(),
                max: max_features,
            });
        }
        for pair in terms.windows(2) {
            if pair[0].term >= pair[1].term {
                return Err(VectorizerError::Unsorted(pair[1].term.clone()));
            }
        }
        if let Some(bad) = terms
            .iter()
            .find(|t| t.df == 0 || t.df as usize > n_documents)
        {
            return Err(VectorizerError::DocumentFrequency {
                term: bad.term.clone(),
                df: bad.df,
                n_documents,
            });
        }

        Ok(Self::build(n_documents, max_features, terms))
    }

    fn build(n_documents: usize, max_features: usize, terms: Vec<TermStat>) -> Self {
        let n = n_documents as f64;
        let idf = terms
            .iter()
            .map(|t| ((1.0 + n) / (1.0 + f64::from(t.df))).ln() + 1.0)
            .collect();
        let columns = terms
            .iter()
            .enumerate()
            .map(|(col, t)| (t.term.clone(), col as u32))
            .collect();

        Self {
            max_features,
            n_documents,
            terms,
            idf,
            columns,
        }
    }

    /// L2-normalized TF-IDF weights of `text`. Unknown terms are ignored.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut weights: Vec<(u32, f64)> = count_terms(text)
            .into_iter()
            .filter_map(|(term, count)| {
                let col = *self.columns.get(&term)?;
                Some((col, f64::from(count) * self.idf[col as usize]))
            })
            .collect();
        weights.sort_by_key(|(col, _)| *col);

        let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm == 0.0 {
            return SparseVector::default();
        }

        let (indices, values) = weights
            .into_iter()
            .map(|(col, w)| (col, (w / norm) as f32))
            .unzip();
        SparseVector { indices, values }
    }

    pub fn transform_all(&self, documents: &[String]) -> CsrMatrix {
        CsrMatrix::from_rows(
            self.n_features() as u32,
            documents.iter().map(|doc| self.transform(doc)),
        )
    }

    pub fn n_features(&self) -> usize {
        self.terms.len()
    }

    pub fn n_documents(&self) -> usize {
        self.n_documents
    }

    pub fn max_features(&self) -> usize {
        self.max_features
    }

    pub fn terms(&self) -> &[TermStat] {
        &self.terms
    }

    #[cfg(test)]
    pub fn column(&self, term: &str) -> Option<u32> {
        self.columns.get(term).copied()
    }

    #[cfg(test)]
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.column(term).map(|col| self.idf[col as usize])
    }
}
