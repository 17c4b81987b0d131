//! Metadata filter predicates for semantic search.
//!
//! A [`FilterSelection`] is what the user picked; a [`Predicate`] is what the
//! vector index receives. Categorical picks (genre, director, actor) become
//! `should` conditions: a movie qualifies if it matches any of them. Numeric
//! ranges (year, rating) become `must` conditions and all of them must hold.
//!
//! The serialized form is the Qdrant filter JSON, with payload keys under
//! `metadata.` as written by the indexing pipeline.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::catalog::MovieRecord;

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

/// User-chosen constraints for a single query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSelection {
    #[serde(default)]
    pub genres: BTreeSet<String>,
    #[serde(default)]
    pub directors: BTreeSet<String>,
    #[serde(default)]
    pub actors: BTreeSet<String>,
    #[serde(default)]
    pub years: Option<Bounds<i32>>,
    #[serde(default)]
    pub ratings: Option<Bounds<f32>>,
}

impl FilterSelection {
    pub fn is_unrestricted(&self) -> bool {
        self.genres.is_empty()
            && self.directors.is_empty()
            && self.actors.is_empty()
            && self.years.is_none()
            && self.ratings.is_none()
    }

    pub fn to_predicate(&self) -> Option<Predicate> {
        build_predicate(self)
    }
}

/// Payload field a condition applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "metadata.genre")]
    Genre,
    #[serde(rename = "metadata.director")]
    Director,
    #[serde(rename = "metadata.actors")]
    Actors,
    #[serde(rename = "metadata.year")]
    Year,
    #[serde(rename = "metadata.rating")]
    Rating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAny {
    pub any: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub gte: f64,
    pub lte: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Match(MatchAny),
    Range(RangeBounds),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub key: Field,
    #[serde(flatten)]
    pub condition: Condition,
}

impl FieldCondition {
    pub fn any_of(key: Field, values: &BTreeSet<String>) -> Self {
        Self {
            key,
            condition: Condition::Match(MatchAny {
                any: values.iter().cloned().collect(),
            }),
        }
    }

    pub fn range(key: Field, gte: f64, lte: f64) -> Self {
        Self {
            key,
            condition: Condition::Range(RangeBounds { gte, lte }),
        }
    }

    pub fn matches(&self, movie: &MovieRecord) -> bool {
        match &self.condition {
            Condition::Match(MatchAny { any }) => {
                let values = match self.key {
                    Field::Genre => &movie.genre,
                    Field::Director => &movie.director,
                    Field::Actors => &movie.actors,
                    Field::Year | Field::Rating => return false,
                };
                values.iter().any(|value| any.contains(value))
            }
            Condition::Range(RangeBounds { gte, lte }) => {
                let value = match self.key {
                    Field::Year => movie.year.map(f64::from),
                    Field::Rating => movie.rating.map(f64::from),
                    Field::Genre | Field::Director | Field::Actors => return false,
                };
                value.is_some_and(|v| *gte <= v && v <= *lte)
            }
        }
    }
}

/// `should` conditions are OR-ed (at least one must match when present);
/// `must` conditions are AND-ed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<FieldCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<FieldCondition>,
}

impl Predicate {
    pub fn matches(&self, movie: &MovieRecord) -> bool {
        let should_ok = self.should.is_empty() || self.should.iter().any(|c| c.matches(movie));
        should_ok && self.must.iter().all(|c| c.matches(movie))
    }
}

/// Translates a selection into a predicate; `None` means unrestricted search.
pub fn build_predicate(selection: &FilterSelection) -> Option<Predicate> {
    let mut should = vec![];
    let mut must = vec![];

    if !selection.genres.is_empty() {
        should.push(FieldCondition::any_of(Field::Genre, &selection.genres));
    }
    if !selection.directors.is_empty() {
        should.push(FieldCondition::any_of(Field::Director, &selection.directors));
    }
    if !selection.actors.is_empty() {
        should.push(FieldCondition::any_of(Field::Actors, &selection.actors));
    }

    if let Some(years) = selection.years {
        must.push(FieldCondition::range(
            Field::Year,
            f64::from(years.min),
            f64::from(years.max),
        ));
    }
    if let Some(ratings) = selection.ratings {
        must.push(FieldCondition::range(
            Field::Rating,
            f64::from(ratings.min),
            f64::from(ratings.max),
        ));
    }

    if should.is_empty() && must.is_empty() {
        None
    } else {
        Some(Predicate { should, must })
    }
}
