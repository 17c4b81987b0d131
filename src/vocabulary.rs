//! Known universe of filterable values, used to populate selection controls.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogError};
use crate::filter::{Bounds, FilterSelection};

/// Rating sliders always end at the top of the scale
pub const MAX_RATING: f32 = 10.0;

/// Raw filter choices as they arrive from the command line or the API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FilterRequest {
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub actors: Vec<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub rating_min: Option<f32>,
    pub rating_max: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterVocabulary {
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub years: Vec<i32>,
    #[serde(default)]
    pub ratings: Vec<f32>,
}

impl FilterVocabulary {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Collects every distinct value present in the catalog, sorted.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut genres = BTreeSet::new();
        let mut directors = BTreeSet::new();
        let mut actors = BTreeSet::new();
        let mut years = BTreeSet::new();
        let mut ratings: Vec<f32> = vec![];

        for movie in catalog.movies() {
            genres.extend(movie.genre.iter().cloned());
            directors.extend(movie.director.iter().cloned());
            actors.extend(movie.actors.iter().cloned());
            years.extend(movie.year);
            ratings.extend(movie.rating);
        }

        ratings.sort_by(|a, b| a.total_cmp(b));
        ratings.dedup();

        Self {
            genres: genres.into_iter().collect(),
            directors: directors.into_iter().collect(),
            actors: actors.into_iter().collect(),
            years: years.into_iter().collect(),
            ratings,
        }
    }

    /// Reads the vocabulary file, falling back to what the catalog contains.
    pub fn load_or_derive(path: &Path, catalog: &Catalog) -> Self {
        match Self::load(path) {
            Ok(vocabulary) => vocabulary,
            Err(CatalogError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(
                    "{} not found, deriving filter vocabulary from catalog",
                    path.display()
                );
                Self::from_catalog(catalog)
            }
            Err(err) => {
                log::warn!(
                    "Failed to read {} ({err}), deriving filter vocabulary from catalog",
                    path.display()
                );
                Self::from_catalog(catalog)
            }
        }
    }

    pub fn year_bounds(&self) -> Option<Bounds<i32>> {
        let min = self.years.iter().min()?;
        let max = self.years.iter().max()?;
        Some(Bounds::new(*min, *max))
    }

    pub fn rating_bounds(&self) -> Option<Bounds<f32>> {
        let min = self.ratings.iter().copied().reduce(f32::min)?;
        Some(Bounds::new(min.min(MAX_RATING), MAX_RATING))
    }

    /// Year range chosen by the user, or `None` when it does not narrow
    /// anything (both ends unset or equal to the known bounds).
    pub fn year_range(&self, min: Option<i32>, max: Option<i32>) -> Option<Bounds<i32>> {
        narrow(self.year_bounds(), min, max, i32::MIN, i32::MAX)
    }

    pub fn rating_range(&self, min: Option<f32>, max: Option<f32>) -> Option<Bounds<f32>> {
        narrow(self.rating_bounds(), min, max, f32::MIN, MAX_RATING)
    }

    /// Turns raw choices into a selection, filling open range ends from the
    /// known bounds. Fails when a range is inverted.
    pub fn resolve(&self, request: FilterRequest) -> Result<FilterSelection, String> {
        let years = self.year_range(request.year_min, request.year_max);
        if let Some(b) = years.filter(|b| b.min > b.max) {
            return Err(format!("year range {}..{} is empty", b.min, b.max));
        }
        let ratings = self.rating_range(request.rating_min, request.rating_max);
        if let Some(b) = ratings.filter(|b| b.min > b.max) {
            return Err(format!("rating range {}..{} is empty", b.min, b.max));
        }

        let clean = |values: Vec<String>| -> BTreeSet<String> {
            values
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        };

        Ok(FilterSelection {
            genres: clean(request.genres),
            directors: clean(request.directors),
            actors: clean(request.actors),
            years,
            ratings,
        })
    }
}

fn narrow<T: Copy + PartialOrd>(
    full: Option<Bounds<T>>,
    min: Option<T>,
    max: Option<T>,
    floor: T,
    ceiling: T,
) -> Option<Bounds<T>> {
    if min.is_none() && max.is_none() {
        return None;
    }

    let selected = Bounds::new(
        min.or(full.map(|b| b.min)).unwrap_or(floor),
        max.or(full.map(|b| b.max)).unwrap_or(ceiling),
    );

    match full {
        Some(full) if full.min == selected.min && full.max == selected.max => None,
        _ => Some(selected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MovieRecord;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            MovieRecord {
                title: "Heat".into(),
                year: Some(1995),
                genre: vec!["Crime".into(), "Drama".into()],
                director: vec!["Michael Mann".into()],
                actors: vec!["Al Pacino".into()],
                rating: Some(8.3),
                ..Default::default()
            },
            MovieRecord {
                title: "Collateral".into(),
                year: Some(2004),
                genre: vec!["Crime".into(), "Thriller".into()],
                director: vec!["Michael Mann".into()],
                actors: vec!["Tom Cruise".into()],
                rating: Some(7.5),
                ..Default::default()
            },
        ])
    }

    #[test]
    fn test_from_catalog_sorted_and_unique() {
        let vocab = FilterVocabulary::from_catalog(&catalog());
        assert_eq!(vocab.genres, vec!["Crime", "Drama", "Thriller"]);
        assert_eq!(vocab.directors, vec!["Michael Mann"]);
        assert_eq!(vocab.years, vec![1995, 2004]);
        assert_eq!(vocab.ratings, vec![7.5, 8.3]);
    }

    #[test]
    fn test_bounds() {
        let vocab = FilterVocabulary::from_catalog(&catalog());
        assert_eq!(vocab.year_bounds(), Some(Bounds::new(1995, 2004)));
        assert_eq!(vocab.rating_bounds(), Some(Bounds::new(7.5, 10.0)));
        assert_eq!(FilterVocabulary::default().year_bounds(), None);
    }

    #[test]
    fn test_full_range_is_not_narrowing() {
        let vocab = FilterVocabulary::from_catalog(&catalog());
        assert_eq!(vocab.year_range(None, None), None);
        assert_eq!(vocab.year_range(Some(1995), Some(2004)), None);
        assert_eq!(vocab.rating_range(Some(7.5), None), None);
    }

    #[test]
    fn test_partial_range_fills_from_bounds() {
        let vocab = FilterVocabulary::from_catalog(&catalog());
        assert_eq!(
            vocab.year_range(Some(2000), None),
            Some(Bounds::new(2000, 2004))
        );
        assert_eq!(
            vocab.rating_range(None, Some(9.0)),
            Some(Bounds::new(7.5, 9.0))
        );
    }

    #[test]
    fn test_range_without_vocabulary() {
        let vocab = FilterVocabulary::default();
        assert_eq!(
            vocab.year_range(Some(2000), None),
            Some(Bounds::new(2000, i32::MAX))
        );
    }

    #[test]
    fn test_resolve_request() {
        let vocab = FilterVocabulary::from_catalog(&catalog());
        let selection = vocab
            .resolve(FilterRequest {
                genres: vec!["Crime".into(), " ".into()],
                year_min: Some(2000),
                rating_min: Some(7.5),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(selection.genres.len(), 1);
        assert_eq!(selection.years, Some(Bounds::new(2000, 2004)));
        // full rating range does not narrow
        assert_eq!(selection.ratings, None);
    }

    #[test]
    fn test_resolve_rejects_inverted_range() {
        let vocab = FilterVocabulary::from_catalog(&catalog());
        let result = vocab.resolve(FilterRequest {
            year_min: Some(2010),
            year_max: Some(2000),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_derive_prefers_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict_filtr.json");
        std::fs::write(
            &path,
            r#"{"genres":["Noir"],"directors":[],"actors":[],"years":[1950],"ratings":[6.0]}"#,
        )
        .unwrap();

        let vocab = FilterVocabulary::load_or_derive(&path, &catalog());
        assert_eq!(vocab.genres, vec!["Noir"]);

        let derived = FilterVocabulary::load_or_derive(&dir.path().join("missing.json"), &catalog());
        assert_eq!(derived.genres, vec!["Crime", "Drama", "Thriller"]);
    }
}
