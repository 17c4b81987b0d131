//! Persisted lexical index artifacts.
//!
//! Three objects are stored per corpus:
//! - `texts.json`: the search documents the index was fitted on
//! - `vectorizer.json`: the fitted vocabulary with document frequencies
//! - `tfidf_matrix.bin`: the document-term weight matrix
//!
//! Every artifact carries the SHA-256 hash of the corpus it was built from.
//! A cache whose hash differs from the current corpus is stale and must be
//! rebuilt.
//!
//! Matrix file format:
//!
//! Header (57 bytes):
//! - version: u8 (1)
//! - corpus_hash: [u8; 32]
//! - rows: u64 (little-endian)
//! - cols: u32 (little-endian)
//! - nnz: u64 (little-endian)
//! - checksum: u32 (CRC32 of the header fields before it and the body)
//!
//! Body:
//! - indptr: [u64; rows + 1]
//! - indices: [u32; nnz]
//! - data: [f32; nnz]

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::lexical::vectorizer::{CsrMatrix, TermStat, TfidfVectorizer};
use crate::storage::StorageManager;

pub const TEXTS_FILE: &str = "texts.json";
pub const VECTORIZER_FILE: &str = "vectorizer.json";
pub const MATRIX_FILE: &str = "tfidf_matrix.bin";

const FORMAT_VERSION: u8 = 1;

/// version(1) + corpus_hash(32) + rows(8) + cols(4) + nnz(8) + checksum(4)
const HEADER_SIZE: usize = 57;
const CHECKSUM_OFFSET: usize = 53;

pub type CorpusHash = [u8; 32];

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache artifact {0} is missing")]
    Missing(&'static str),

    #[error("Cache is stale: {0}")]
    Stale(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,
}

/// SHA-256 over the corpus, each document length-prefixed so that
/// document boundaries are part of the hash.
pub fn corpus_hash(documents: &[String]) -> CorpusHash {
    let mut hasher = Sha256::new();
    hasher.update((documents.len() as u64).to_le_bytes());
    for doc in documents {
        hasher.update((doc.len() as u64).to_le_bytes());
        hasher.update(doc.as_bytes());
    }
    hasher.finalize().into()
}

pub fn hash_hex(hash: &CorpusHash) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct TextsArtifact {
    corpus_hash: String,
    documents: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorizerArtifact {
    corpus_hash: String,
    max_features: usize,
    n_documents: usize,
    terms: Vec<TermStat>,
}

/// A fully loaded cache entry.
#[derive(Debug)]
pub struct CachedIndex {
    pub documents: Vec<String>,
    pub vectorizer: TfidfVectorizer,
    pub matrix: CsrMatrix,
}

pub struct IndexCache {
    storage: Box<dyn StorageManager>,
}

impl IndexCache {
    pub fn new(storage: Box<dyn StorageManager>) -> Self {
        Self { storage }
    }

    /// True when all three artifacts are present.
    pub fn is_complete(&self) -> bool {
        [TEXTS_FILE, VECTORIZER_FILE, MATRIX_FILE]
            .iter()
            .all(|ident| self.storage.exists(ident))
    }

    pub fn load(&self, expected: &CorpusHash, max_features: usize) -> Result<CachedIndex, CacheError> {
        let expected_hex = hash_hex(expected);

        let texts: TextsArtifact = serde_json::from_slice(&self.read(TEXTS_FILE)?)?;
        if texts.corpus_hash != expected_hex {
            return Err(CacheError::Stale(format!(
                "corpus hash {} differs from {expected_hex}",
                texts.corpus_hash
            )));
        }

        let stored: VectorizerArtifact = serde_json::from_slice(&self.read(VECTORIZER_FILE)?)?;
        if stored.corpus_hash != expected_hex {
            return Err(CacheError::Stale(
                "vectorizer was fitted on a different corpus".to_string(),
            ));
        }
        if stored.max_features != max_features {
            return Err(CacheError::Stale(format!(
                "max_features changed from {} to {max_features}",
                stored.max_features
            )));
        }
        if stored.n_documents != texts.documents.len() {
            return Err(CacheError::InvalidFormat(format!(
                "vectorizer fitted on {} documents, texts hold {}",
                stored.n_documents,
                texts.documents.len()
            )));
        }

        let vectorizer =
            TfidfVectorizer::from_parts(stored.n_documents, stored.max_features, stored.terms)
                .map_err(|e| CacheError::InvalidFormat(e.to_string()))?;

        let (matrix_hash, matrix) = decode_matrix(&self.read(MATRIX_FILE)?)?;
        if matrix_hash != *expected {
            return Err(CacheError::Stale(
                "matrix was built from a different corpus".to_string(),
            ));
        }
        if matrix.rows() != texts.documents.len() || matrix.n_cols as usize != vectorizer.n_features() {
            return Err(CacheError::InvalidFormat(format!(
                "matrix shape {}x{} does not match {} documents and {} terms",
                matrix.rows(),
                matrix.n_cols,
                texts.documents.len(),
                vectorizer.n_features()
            )));
        }

        Ok(CachedIndex {
            documents: texts.documents,
            vectorizer,
            matrix,
        })
    }

    pub fn save(
        &self,
        hash: &CorpusHash,
        documents: &[String],
        vectorizer: &TfidfVectorizer,
        matrix: &CsrMatrix,
    ) -> Result<(), CacheError> {
        let hex = hash_hex(hash);

        let texts = TextsArtifact {
            corpus_hash: hex.clone(),
            documents: documents.to_vec(),
        };
        let stored = VectorizerArtifact {
            corpus_hash: hex,
            max_features: vectorizer.max_features(),
            n_documents: vectorizer.n_documents(),
            terms: vectorizer.terms().to_vec(),
        };

        self.storage.write(MATRIX_FILE, &encode_matrix(hash, matrix))?;
        self.storage
            .write(VECTORIZER_FILE, &serde_json::to_vec(&stored)?)?;
        self.storage.write(TEXTS_FILE, &serde_json::to_vec(&texts)?)?;
        Ok(())
    }

    /// Removes every artifact that exists.
    pub fn clear(&self) -> Result<(), CacheError> {
        for ident in [TEXTS_FILE, VECTORIZER_FILE, MATRIX_FILE] {
            if self.storage.exists(ident) {
                self.storage.delete(ident)?;
            }
        }
        Ok(())
    }

    fn read(&self, ident: &'static str) -> Result<Vec<u8>, CacheError> {
        match self.storage.read(ident) {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(CacheError::Missing(ident)),
            Err(err) => Err(err.into()),
        }
    }
}

pub fn encode_matrix(hash: &CorpusHash, matrix: &CsrMatrix) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(
        HEADER_SIZE + matrix.indptr.len() * 8 + matrix.indices.len() * 4 + matrix.data.len() * 4,
    );

    bytes.push(FORMAT_VERSION);
    bytes.extend_from_slice(hash);
    bytes.extend_from_slice(&(matrix.rows() as u64).to_le_bytes());
    bytes.extend_from_slice(&matrix.n_cols.to_le_bytes());
    bytes.extend_from_slice(&(matrix.nnz() as u64).to_le_bytes());
    // checksum placeholder
    bytes.extend_from_slice(&[0u8; 4]);

    for ptr in &matrix.indptr {
        bytes.extend_from_slice(&ptr.to_le_bytes());
    }
    for col in &matrix.indices {
        bytes.extend_from_slice(&col.to_le_bytes());
    }
    for value in &matrix.data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    let checksum = compute_checksum(&bytes);
    bytes[CHECKSUM_OFFSET..HEADER_SIZE].copy_from_slice(&checksum.to_le_bytes());
    bytes
}

pub fn decode_matrix(bytes: &[u8]) -> Result<(CorpusHash, CsrMatrix), CacheError> {
    if bytes.len() < HEADER_SIZE {
        return Err(CacheError::InvalidFormat(format!(
            "{} bytes is shorter than the header",
            bytes.len()
        )));
    }

    let version = bytes[0];
    if version != FORMAT_VERSION {
        return Err(CacheError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = u32::from_le_bytes(le_array(&bytes[CHECKSUM_OFFSET..HEADER_SIZE]));
    if stored_checksum != compute_checksum(bytes) {
        return Err(CacheError::ChecksumMismatch);
    }

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes[1..33]);
    let rows = u64::from_le_bytes(le_array(&bytes[33..41]));
    let n_cols = u32::from_le_bytes(le_array(&bytes[41..45]));
    let nnz = u64::from_le_bytes(le_array(&bytes[45..53]));

    let body_len = rows
        .checked_add(1)
        .and_then(|n| n.checked_mul(8))
        .and_then(|n| n.checked_add(nnz.checked_mul(8)?))
        .ok_or_else(|| CacheError::InvalidFormat("matrix dimensions overflow".to_string()))?;
    if (bytes.len() - HEADER_SIZE) as u64 != body_len {
        return Err(CacheError::InvalidFormat(format!(
            "body is {} bytes, header declares {body_len}",
            bytes.len() - HEADER_SIZE
        )));
    }

    let body = &bytes[HEADER_SIZE..];
    let (indptr_bytes, rest) = body.split_at((rows as usize + 1) * 8);
    let (indices_bytes, data_bytes) = rest.split_at(nnz as usize * 4);

    let matrix = CsrMatrix {
        n_cols,
        indptr: indptr_bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(le_array(c)))
            .collect(),
        indices: indices_bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(le_array(c)))
            .collect(),
        data: data_bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(le_array(c)))
            .collect(),
    };
    matrix.validate().map_err(CacheError::InvalidFormat)?;

    Ok((hash, matrix))
}

/// CRC32 over the whole file with the checksum field skipped.
fn compute_checksum(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&bytes[..CHECKSUM_OFFSET]);
    hasher.update(&bytes[HEADER_SIZE..]);
    hasher.finalize()
}

fn le_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}
