//! Movie catalog loaded from the films CSV.
//!
//! The catalog is read once and treated as read-only for the rest of the
//! process. Row order is significant: the lexical index stores one row per
//! movie in exactly this order.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

/// Number of movies shown by the random selection
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One movie of the catalog.
///
/// Multi-valued fields are comma separated in the CSV and lists in vector
/// index payloads; both forms deserialize into `Vec<String>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    #[serde(rename = "movie_title", default)]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub genre: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub director: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub actors: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_rating")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
}

impl MovieRecord {
    pub fn genre_text(&self) -> String {
        self.genre.join(", ")
    }

    pub fn director_text(&self) -> String {
        self.director.join(", ")
    }

    pub fn actors_text(&self) -> String {
        self.actors.join(", ")
    }

    /// Poster URL, only when it looks fetchable.
    pub fn poster_url(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .filter(|url| url.starts_with("http"))
    }
}

/// A movie plus its position and score in a result list.
///
/// Lexical scores are cosine similarities in [0, 1]; semantic scores are
/// whatever the vector index reports and only meaningful for ordering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub movie: MovieRecord,
    pub score: f32,
    /// 1-based position in the result list
    pub rank: usize,
    /// Text the vector index embedded for this movie
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(default)]
    movie_title: String,
    #[serde(default)]
    year: String,
    #[serde(default)]
    genre: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    director: String,
    #[serde(default)]
    actors: String,
    #[serde(default)]
    rating: String,
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    page_url: String,
}

impl From<CatalogRow> for MovieRecord {
    fn from(row: CatalogRow) -> Self {
        MovieRecord {
            title: row.movie_title.trim().to_string(),
            year: parse_year(&row.year),
            genre: split_list(&row.genre),
            director: split_list(&row.director),
            actors: split_list(&row.actors),
            description: row.description.trim().to_string(),
            rating: row.rating.trim().parse::<f32>().ok().filter(|r| r.is_finite()),
            image_url: non_empty(row.image_url),
            page_url: non_empty(row.page_url),
        }
    }
}

/// Years may come out of spreadsheet tools as "2005.0".
fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    raw.parse::<i32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|y| y.is_finite() && y.fract() == 0.0)
            .map(|y| y as i32)
    })
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}

/// A number as it may appear in index payloads: pandas writes integer
/// columns holding gaps as floats, and some exports quote numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Int(i64),
    Float(f64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<LooseNumber>::deserialize(deserializer)? {
        Some(LooseNumber::Int(year)) => i32::try_from(year).ok(),
        Some(LooseNumber::Float(year)) => parse_year(&year.to_string()),
        Some(LooseNumber::Text(year)) => parse_year(&year),
        Some(LooseNumber::Other(_)) | None => None,
    })
}

fn lenient_rating<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let rating = match Option::<LooseNumber>::deserialize(deserializer)? {
        Some(LooseNumber::Int(rating)) => Some(rating as f32),
        Some(LooseNumber::Float(rating)) => Some(rating as f32),
        Some(LooseNumber::Text(rating)) => rating.trim().parse::<f32>().ok(),
        Some(LooseNumber::Other(_)) | None => None,
    };
    Ok(rating.filter(|r| r.is_finite()))
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => split_list(&value),
        Some(OneOrMany::Many(values)) => values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect(),
        None => vec![],
    })
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    movies: Vec<MovieRecord>,
}

impl Catalog {
    pub fn new(movies: Vec<MovieRecord>) -> Self {
        Self { movies }
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let now = Instant::now();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_path(path)?;

        let mut movies = vec![];
        for row in reader.deserialize::<CatalogRow>() {
            movies.push(MovieRecord::from(row?));
        }

        log::debug!(
            "took {}ms to read {} movies from {}",
            now.elapsed().as_micros() as f64 / 1000.0,
            movies.len(),
            path.display()
        );

        Ok(Self { movies })
    }

    /// Loads the catalog, or returns an empty one after logging a warning.
    ///
    /// Everything downstream of an empty catalog yields empty results.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(catalog) => {
                log::info!("Loaded {} movies from {}", catalog.len(), path.display());
                catalog
            }
            Err(CatalogError::Csv(err)) if is_not_found(&err) => {
                log::warn!("Catalog {} not found, continuing empty", path.display());
                Self::default()
            }
            Err(err) => {
                log::warn!(
                    "Catalog {} could not be read ({err}), continuing empty",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn movies(&self) -> &[MovieRecord] {
        &self.movies
    }

    pub fn get(&self, idx: usize) -> Option<&MovieRecord> {
        self.movies.get(idx)
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    /// Up to `count` distinct movies in random order.
    pub fn sample(&self, count: usize) -> Vec<MovieRecord> {
        self.sample_with(count, &mut rand::rng())
    }

    pub fn sample_with<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<MovieRecord> {
        if self.movies.is_empty() {
            log::warn!("Catalog is empty, nothing to sample");
            return vec![];
        }

        self.movies.choose_multiple(rng, count).cloned().collect()
    }
}

fn is_not_found(err: &csv::Error) -> bool {
    matches!(err.kind(), csv::ErrorKind::Io(io) if io.kind() == ErrorKind::NotFound)
}
