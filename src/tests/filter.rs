use serde_json::json;

use crate::catalog::Catalog;
use crate::vocabulary::{FilterRequest, FilterVocabulary};

use super::movie;

fn catalog() -> Catalog {
    let mut scorsese = movie("The Departed", "Crime", 2006, "undercover cops and moles");
    scorsese.director = vec!["Martin Scorsese".to_string()];
    scorsese.rating = Some(8.5);

    Catalog::new(vec![
        movie("Old Comedy", "Comedy", 1995, ""),
        movie("New Comedy", "Comedy", 2005, ""),
        movie("Mid Drama", "Drama", 2008, ""),
        movie("Mid Action", "Action", 2008, ""),
        movie("Late Drama", "Drama", 2020, ""),
        scorsese,
    ])
}

fn matching<'a>(catalog: &'a Catalog, request: FilterRequest) -> Vec<&'a str> {
    let vocabulary = FilterVocabulary::from_catalog(catalog);
    let predicate = vocabulary.resolve(request).unwrap().to_predicate();
    catalog
        .movies()
        .iter()
        .filter(|m| predicate.as_ref().map_or(true, |p| p.matches(m)))
        .map(|m| m.title.as_str())
        .collect()
}

#[test]
fn test_genres_widen_and_years_narrow() {
    let catalog = catalog();
    let request = FilterRequest {
        genres: vec!["Drama".into(), "Comedy".into()],
        year_min: Some(2000),
        year_max: Some(2010),
        ..Default::default()
    };

    assert_eq!(matching(&catalog, request.clone()), vec!["New Comedy", "Mid Drama"]);

    let predicate = FilterVocabulary::from_catalog(&catalog)
        .resolve(request)
        .unwrap()
        .to_predicate()
        .unwrap();
    assert_eq!(
        serde_json::to_value(&predicate).unwrap(),
        json!({
            "should": [{"key": "metadata.genre", "match": {"any": ["Comedy", "Drama"]}}],
            "must": [{"key": "metadata.year", "range": {"gte": 2000.0, "lte": 2010.0}}]
        })
    );
}

#[test]
fn test_director_or_genre() {
    let catalog = catalog();
    let request = FilterRequest {
        genres: vec!["Action".into()],
        directors: vec!["Martin Scorsese".into()],
        ..Default::default()
    };
    assert_eq!(matching(&catalog, request), vec!["Mid Action", "The Departed"]);
}

#[test]
fn test_rating_floor() {
    let catalog = catalog();
    let request = FilterRequest {
        rating_min: Some(8.0),
        ..Default::default()
    };
    assert_eq!(matching(&catalog, request), vec!["The Departed"]);
}

#[test]
fn test_full_range_is_unrestricted() {
    let catalog = catalog();
    let vocabulary = FilterVocabulary::from_catalog(&catalog);
    let request = FilterRequest {
        year_min: Some(1995),
        year_max: Some(2020),
        ..Default::default()
    };

    let selection = vocabulary.resolve(request.clone()).unwrap();
    assert!(selection.is_unrestricted());
    assert!(selection.to_predicate().is_none());
    assert_eq!(matching(&catalog, request).len(), catalog.len());
}

#[test]
fn test_blank_values_are_ignored() {
    let catalog = catalog();
    let vocabulary = FilterVocabulary::from_catalog(&catalog);
    let request = FilterRequest {
        genres: vec!["  ".into()],
        actors: vec![String::new()],
        ..Default::default()
    };
    assert!(vocabulary.resolve(request).unwrap().to_predicate().is_none());
}
